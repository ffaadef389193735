//! Integración del executor: resolución por complejidad, estadísticas y
//! reporting de desenlaces al state machine.

use serde_json::{json, Map, Value};

use think_core::{ExecutionStatus, Flow, FlowCoreError, FlowExecutor, FlowStatus, FlowStep, TemplateProvider};

/// Proveedor con catálogo fijo que devuelve sus parámetros como JSON.
struct StaticCatalog(&'static [&'static str]);

impl TemplateProvider for StaticCatalog {
    fn get_template(&self, name: &str, params: &Map<String, Value>) -> Result<String, FlowCoreError> {
        if !self.has_template(name) {
            return Err(FlowCoreError::TemplateMissing { template_name: name.to_string() });
        }
        Ok(json!({ "template": name, "params": params }).to_string())
    }

    fn has_template(&self, name: &str) -> bool {
        self.0.contains(&name)
    }
}

fn one_step_flow(template: &str) -> Flow {
    let mut flow = Flow::new("single", "session-exec-it");
    flow.add_step(FlowStep::new("solo", "Solo", "generic", template)).unwrap();
    flow
}

#[test]
fn complexity_variant_is_used_when_available() {
    let catalog = StaticCatalog(&["analyze", "analyze_high"]);
    let mut executor = FlowExecutor::new(catalog);

    let mut flow = one_step_flow("analyze");
    flow.context.insert("complexity".into(), json!("high"));
    let flow_id = executor.register_flow(flow).unwrap();

    let execution = executor.execute_step(flow_id, "solo", &Map::new()).unwrap();
    assert_eq!(execution.template_name, "analyze_high");

    // contexto de llamada pisa al del flow
    let mut call = Map::new();
    call.insert("complexity".into(), json!("low"));
    let execution = executor.execute_step(flow_id, "solo", &call).unwrap();
    assert_eq!(execution.template_name, "analyze", "unknown variant falls back to base");
}

#[test]
fn config_template_override_bypasses_resolution() {
    let catalog = StaticCatalog(&["analyze", "analyze_high", "special"]);
    let mut executor = FlowExecutor::new(catalog);

    let mut flow = Flow::new("override", "session-exec-it");
    flow.context.insert("complexity".into(), json!("high"));
    flow.add_step(FlowStep::new("solo", "Solo", "generic", "analyze").with_config(json!({ "template": "special" })))
        .unwrap();
    let flow_id = executor.register_flow(flow).unwrap();

    let execution = executor.execute_step(flow_id, "solo", &Map::new()).unwrap();
    assert_eq!(execution.template_name, "special");
}

#[test]
fn stats_accumulate_across_a_run() {
    let catalog = StaticCatalog(&["tpl_a", "tpl_b"]);
    let mut executor = FlowExecutor::new(catalog);
    let mut flow = Flow::new("stats", "session-exec-it");
    flow.add_step(FlowStep::new("a", "A", "generic", "tpl_a")).unwrap();
    flow.add_step(FlowStep::new("b", "B", "generic", "tpl_b").with_dependencies(vec!["a".into()]))
        .unwrap();
    let flow_id = executor.register_flow(flow).unwrap();

    executor.execute_flow(flow_id, false, &Map::new()).unwrap();

    let flow_stats = executor.stats().flow(flow_id).unwrap();
    assert_eq!(flow_stats.executions, 2);
    assert_eq!(flow_stats.successes, 2);
    assert_eq!(flow_stats.failures, 0);
    assert_eq!(executor.stats().step(flow_id, "a").unwrap().executions, 1);
}

#[test]
fn failed_resolution_is_counted_in_stats() {
    let mut executor = FlowExecutor::new(StaticCatalog(&[]));
    let flow_id = executor.register_flow(one_step_flow("ghost_tpl")).unwrap();

    let err = executor.execute_step(flow_id, "solo", &Map::new()).unwrap_err();
    assert!(matches!(err, FlowCoreError::TemplateMissing { .. }));

    let step_stats = executor.stats().step(flow_id, "solo").unwrap();
    assert_eq!(step_stats.executions, 1);
    assert_eq!(step_stats.failures, 1);
}

#[test]
fn run_summary_reflects_machine_history() {
    let catalog = StaticCatalog(&["tpl_a"]);
    let mut executor = FlowExecutor::new(catalog);
    let flow_id = executor.register_flow(one_step_flow("tpl_a")).unwrap();

    let summary = executor.execute_flow(flow_id, false, &Map::new()).unwrap();
    assert_eq!(summary.status, ExecutionStatus::Completed);
    assert_eq!(summary.executions.len(), 1);

    let flow = executor.flow(flow_id).unwrap();
    assert_eq!(flow.status, FlowStatus::Completed);
    // Start + CompleteStep + Complete (auto)
    assert_eq!(executor.machine().history().len(flow_id), 3);
}

#[test]
fn unknown_flow_and_step_are_reported_as_such() {
    let mut executor = FlowExecutor::new(StaticCatalog(&["tpl_a"]));
    let err = executor.execute_flow(uuid::Uuid::new_v4(), false, &Map::new()).unwrap_err();
    assert!(matches!(err, FlowCoreError::FlowNotFound { .. }));

    let flow_id = executor.register_flow(one_step_flow("tpl_a")).unwrap();
    let err = executor.execute_step(flow_id, "ghost", &Map::new()).unwrap_err();
    assert!(matches!(err, FlowCoreError::StepNotFound { .. }));
}

#[test]
fn registration_validates_the_graph() {
    let mut executor = FlowExecutor::new(StaticCatalog(&["tpl_a"]));
    let mut flow = Flow::new("bad", "session-exec-it");
    flow.add_step(FlowStep::new("a", "A", "generic", "tpl_a").with_dependencies(vec!["missing".into()]))
        .unwrap();
    let err = executor.register_flow(flow).unwrap_err();
    assert!(matches!(err, FlowCoreError::UnknownDependency { .. }));
}
