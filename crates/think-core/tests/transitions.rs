//! Integración del state machine: legalidad de la tabla, escapes, efectos
//! secundarios con rollback y persistencia best-effort.

use serde_json::json;

use think_core::gateway::FailingSessionStore;
use think_core::{Flow, FlowCoreError, FlowEvent, FlowStateMachine, FlowStatus, FlowStep, InMemorySessionStore,
                 PersistenceGateway, StepStatus};

fn flow_with_steps(ids: &[&str]) -> Flow {
    let mut flow = Flow::new("fsm-test", "session-fsm");
    for id in ids {
        flow.add_step(FlowStep::new(*id, *id, "generic", format!("tpl_{id}"))).unwrap();
    }
    flow
}

#[test]
fn lifecycle_happy_path() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["only"]);

    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    assert_eq!(flow.status, FlowStatus::Running);
    assert!(flow.start_time.is_some());

    machine.transition(&mut flow, FlowEvent::Pause, json!({})).unwrap();
    assert_eq!(flow.status, FlowStatus::Paused);
    assert!(machine.paused_since(flow.flow_id).is_some());

    machine.transition(&mut flow, FlowEvent::Resume, json!({})).unwrap();
    assert_eq!(flow.status, FlowStatus::Running);
    assert!(machine.paused_since(flow.flow_id).is_none());

    // completar el único step dispara el auto-complete (follow-up Complete)
    let status = machine.transition(&mut flow,
                                    FlowEvent::CompleteStep,
                                    json!({ "step_id": "only", "result": "done" }))
                        .unwrap();
    assert_eq!(status, FlowStatus::Completed);
    assert!(flow.end_time.is_some());
    let last = machine.history().last(flow.flow_id).unwrap();
    assert_eq!(last.event, FlowEvent::Complete);
    assert_eq!(last.metadata["auto_completed"], json!(true));

    let entries = machine.history().list(flow.flow_id);
    assert!(entries[0].duration_seconds.is_none(), "no prior state to measure against");
    assert!(entries[1].duration_seconds.is_some(), "time spent running before the pause");
}

#[test]
fn illegal_event_is_rejected_without_mutation() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);

    let err = machine.transition(&mut flow, FlowEvent::Pause, json!({})).unwrap_err();
    assert!(matches!(err,
                     FlowCoreError::InvalidTransition { current_state: FlowStatus::Initialized,
                                                        event: FlowEvent::Pause,
                                                        .. }));
    assert_eq!(flow.status, FlowStatus::Initialized);
    assert!(machine.history().is_empty(flow.flow_id), "rejected event leaves no history");
}

#[test]
fn manual_override_forces_target_state() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);

    let status = machine.transition(&mut flow,
                                    FlowEvent::ManualOverride,
                                    json!({ "target_state": "paused" }))
                        .unwrap();
    assert_eq!(status, FlowStatus::Paused);
    let last = machine.history().last(flow.flow_id).unwrap();
    assert_eq!(last.metadata["forced"], json!(true));

    // sin target_state válido el override es inválido
    let mut other = flow_with_steps(&["a"]);
    let err = machine.transition(&mut other, FlowEvent::ManualOverride, json!({ "target_state": "nope" }))
                     .unwrap_err();
    assert!(matches!(err, FlowCoreError::InvalidTransition { .. }));
}

#[test]
fn error_escape_is_always_legal() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    machine.transition(&mut flow, FlowEvent::Pause, json!({})).unwrap();

    let status = machine.transition(&mut flow, FlowEvent::Error, json!({ "error_message": "boom" }))
                        .unwrap();
    assert_eq!(status, FlowStatus::Failed);
    assert_eq!(flow.context.get("error_message"), Some(&json!("boom")));
    assert!(machine.paused_since(flow.flow_id).is_none(), "failed flow leaves the paused index");
}

#[test]
fn side_effect_failure_rolls_back_and_records_it() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();

    // complete_step sin step_id: el efecto falla, el estado se revierte
    let err = machine.transition(&mut flow, FlowEvent::CompleteStep, json!({ "result": "x" }))
                     .unwrap_err();
    assert!(matches!(err, FlowCoreError::FlowState { .. }));
    assert_eq!(flow.status, FlowStatus::Running);

    let entries = machine.history().list(flow.flow_id);
    let last = entries.last().unwrap();
    assert_eq!(last.metadata["failed_transition"], json!(true));
    // la intención original también quedó registrada (antes de la reversión)
    assert_eq!(entries[entries.len() - 2].event, FlowEvent::CompleteStep);
}

#[test]
fn critical_failure_without_budget_escalates() {
    let mut machine = FlowStateMachine::default();
    let mut flow = Flow::new("critical", "session-fsm");
    flow.add_step(FlowStep::new("core", "core", "generic", "tpl").with_max_retries(0))
        .unwrap();
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();

    let status = machine.transition(&mut flow,
                                    FlowEvent::FailStep,
                                    json!({ "step_id": "core", "error_message": "bad", "critical": true }))
                        .unwrap();
    assert_eq!(status, FlowStatus::Failed, "critical step without retries fails the flow");
    assert_eq!(flow.steps.get("core").unwrap().status, StepStatus::Failed);
}

#[test]
fn non_critical_failure_with_budget_keeps_running() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a", "b"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();

    let status = machine.transition(&mut flow,
                                    FlowEvent::FailStep,
                                    json!({ "step_id": "a", "error_message": "x", "critical": true }))
                        .unwrap();
    assert_eq!(status, FlowStatus::Running, "budget remains, no escalation");
    assert!(flow.steps.get("a").unwrap().can_retry());

    machine.transition(&mut flow, FlowEvent::RetryStep, json!({ "step_id": "a" })).unwrap();
    assert_eq!(flow.steps.get("a").unwrap().status, StepStatus::Pending);
}

#[test]
fn retry_without_budget_is_a_side_effect_failure() {
    let mut machine = FlowStateMachine::default();
    let mut flow = Flow::new("exhausted", "session-fsm");
    flow.add_step(FlowStep::new("a", "a", "generic", "tpl").with_max_retries(0)).unwrap();
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    machine.transition(&mut flow, FlowEvent::FailStep, json!({ "step_id": "a" })).unwrap();

    let err = machine.transition(&mut flow, FlowEvent::RetryStep, json!({ "step_id": "a" }))
                     .unwrap_err();
    assert!(matches!(err, FlowCoreError::FlowState { .. }));
    assert_eq!(flow.steps.get("a").unwrap().status, StepStatus::Failed, "step untouched");
}

#[test]
fn paused_flows_show_up_in_timeout_sweep() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    machine.transition(&mut flow, FlowEvent::Pause, json!({})).unwrap();

    let stale = machine.check_for_timeouts(chrono::Duration::zero());
    assert_eq!(stale, vec![flow.flow_id]);
    assert!(machine.check_for_timeouts(chrono::Duration::hours(1)).is_empty());

    // el caller decide el evento; Timeout desde Paused lleva a Failed
    machine.transition(&mut flow, FlowEvent::Timeout, json!({})).unwrap();
    assert_eq!(flow.status, FlowStatus::Failed);
}

#[test]
fn reset_from_terminal_states_rewinds_everything() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    machine.transition(&mut flow, FlowEvent::Cancel, json!({ "reason": "operator" })).unwrap();
    assert_eq!(flow.status, FlowStatus::Cancelled);
    assert_eq!(flow.context.get("cancel_reason"), Some(&json!("operator")));

    machine.transition(&mut flow, FlowEvent::Reset, json!({})).unwrap();
    assert_eq!(flow.status, FlowStatus::Initialized);
    assert!(flow.start_time.is_none() && flow.end_time.is_none());
    assert_eq!(flow.current_step_index, 0);
}

#[test]
fn reset_is_idempotent() {
    let mut machine = FlowStateMachine::default();
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    machine.transition(&mut flow, FlowEvent::CompleteStep, json!({ "step_id": "a", "result": "r" }))
           .unwrap();
    assert_eq!(flow.status, FlowStatus::Completed);

    // dos Reset seguidos: ambos legales, ambos dejan el flow en cero
    for _ in 0..2 {
        let status = machine.transition(&mut flow, FlowEvent::Reset, json!({})).unwrap();
        assert_eq!(status, FlowStatus::Initialized);
        assert!(flow.steps
                    .values()
                    .all(|s| s.status == StepStatus::Pending && s.retry_count == 0));
    }
}

#[test]
fn snapshot_is_persisted_after_each_transition() {
    let store = InMemorySessionStore::new();
    let mut machine = FlowStateMachine::default().with_gateway(Box::new(store.clone()));
    let mut flow = flow_with_steps(&["a"]);
    machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();

    let blob = store.load("session-fsm").expect("snapshot written");
    assert_eq!(blob["flow_state"]["status"], json!("running"));
    assert_eq!(blob["persistence_version"], json!(1));
}

#[test]
fn persistence_failure_degrades_durability_only() {
    let mut machine = FlowStateMachine::default().with_gateway(Box::new(FailingSessionStore));
    let mut flow = flow_with_steps(&["a"]);

    let status = machine.transition(&mut flow, FlowEvent::Start, json!({})).unwrap();
    assert_eq!(status, FlowStatus::Running, "in-memory behavior unaffected by write failure");
    assert_eq!(machine.history().len(flow.flow_id), 1);
}
