//! Demo ejecutable del coordinador de flujos.
//!
//! Corre tres validaciones en memoria: una corrida desatendida
//! (`quick_analysis`), una sesión `deep_thinking` conducida por un caller
//! simulado (con fan-out de evidencia) y un ciclo de snapshot/restauración
//! con rollback.

use serde_json::{json, Map};

use think_adapters::flows::{DEEP_THINKING, QUICK_ANALYSIS};
use think_adapters::{builtin_definitions, default_templates};
use think_core::{FlowEvent, FlowExecutor, FlowStateMachine, FlowStatus, InMemorySessionStore, RecoveryService};

fn run_quick_analysis_demo() {
    println!("== quick_analysis (desatendido) ==");
    let registry = builtin_definitions();
    let mut executor = FlowExecutor::new(default_templates());

    let mut flow = registry.materialize(QUICK_ANALYSIS, "demo-quick").expect("builtin definition");
    flow.context.insert("question".into(), json!("does the cache help at this scale?"));
    let flow_id = executor.register_flow(flow).expect("valid flow");

    let summary = executor.execute_flow(flow_id, false, &Map::new()).expect("run to completion");
    println!("  status: {:?} ({} steps ok)", summary.status, summary.steps_succeeded);
    let progress = executor.flow(flow_id).expect("registered").get_progress();
    println!("  progress: {:.0}% complete", progress.percent_complete);
}

fn run_deep_thinking_demo() {
    println!("== deep_thinking (caller externo simulado) ==");
    let registry = builtin_definitions();
    let mut executor = FlowExecutor::new(default_templates());

    let mut flow = registry.materialize(DEEP_THINKING, "demo-deep").expect("builtin definition");
    flow.context.insert("question".into(), json!("why does ice float?"));
    flow.context.insert("complexity".into(), json!("high"));
    let flow_id = executor.register_flow(flow).expect("valid flow");

    executor.transition(flow_id, FlowEvent::Start, json!({})).expect("start");

    // el caller resuelve la descomposición y reporta su respuesta
    let decompose = executor.execute_step(flow_id, "decompose", &Map::new()).expect("resolve decompose");
    println!("  decompose -> template '{}'", decompose.template_name);
    let answer = json!({ "sub_questions": ["density of ice vs water", "hydrogen bond geometry"] });
    executor.transition(flow_id,
                        FlowEvent::CompleteStep,
                        json!({ "step_id": "decompose", "result": answer.to_string() }))
            .expect("report decompose");

    // evidencia: fan-out por sub-pregunta
    let evidence = executor.execute_step(flow_id, "evidence", &Map::new()).expect("resolve evidence");
    let n = evidence.iterations.as_ref().map(Vec::len).unwrap_or(0);
    println!("  evidence -> {n} iterations");
    executor.transition(flow_id,
                        FlowEvent::CompleteStep,
                        json!({ "step_id": "evidence", "result": evidence.template_content }))
            .expect("report evidence");

    for step_id in ["evaluate", "synthesize"] {
        let execution = executor.execute_step(flow_id, step_id, &Map::new()).expect("resolve step");
        executor.transition(flow_id,
                            FlowEvent::CompleteStep,
                            json!({ "step_id": step_id, "result": execution.template_content }))
                .expect("report step");
    }

    let flow = executor.flow(flow_id).expect("registered");
    println!("  final status: {} (history {} entries)",
             flow.status,
             executor.machine().history().len(flow_id));
}

fn run_recovery_demo() {
    println!("== snapshot / restore / rollback ==");
    let registry = builtin_definitions();
    let store = InMemorySessionStore::new();
    let machine = FlowStateMachine::default().with_gateway(Box::new(store.clone()));
    let mut executor = FlowExecutor::new(default_templates()).with_machine(machine);

    let mut flow = registry.materialize(QUICK_ANALYSIS, "demo-recovery").expect("builtin definition");
    flow.context.insert("question".into(), json!("can we resume after a crash?"));
    let flow_id = executor.register_flow(flow).expect("valid flow");
    executor.execute_flow(flow_id, false, &Map::new()).expect("run to completion");

    let recovery = RecoveryService::new(store);
    let restored = recovery.restore(flow_id, "demo-recovery")
                           .expect("readable snapshot")
                           .expect("snapshot present");
    println!("  restored '{}' as {} with {} steps",
             restored.flow.flow_name,
             restored.flow.status,
             restored.flow.steps.len());

    let mut flow = restored.flow;
    recovery.rollback_to_step(&mut flow, "analyze").expect("rollback");
    println!("  rolled back to 'analyze'; cursor at {}, conclude now {}",
             flow.current_step_index,
             flow.steps.get("conclude").map(|s| s.status.as_str()).unwrap_or("?"));
    assert_eq!(flow.status, FlowStatus::Completed, "rollback does not touch flow status by itself");
}

fn main() {
    run_quick_analysis_demo();
    run_deep_thinking_demo();
    run_recovery_demo();
    println!("done.");
}
