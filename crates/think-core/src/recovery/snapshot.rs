//! Codificación y decodificación del snapshot persistido.
//!
//! Shape del blob (versión 1):
//! `{flow_state, current_step, step_number, last_updated, persistence_version}`
//! más `quality_metrics.flow_state_history` (cola acotada del historial) y un
//! bloque `stats` compacto.
//!
//! La decodificación es defensiva: status o timestamps inválidos degradan a un
//! default seguro (`initialized` / `pending` / campo omitido) con warning, en
//! lugar de abortar la restauración. El orden de steps viaja explícito en
//! `step_order` para no depender del orden de claves del objeto JSON.

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::constants::PERSISTENCE_VERSION;
use crate::machine::history::TransitionRecord;
use crate::model::{Flow, FlowStatus, FlowStep, StepStatus};

/// Serializa el estado mutable completo de un Flow.
pub fn encode_flow(flow: &Flow) -> Value {
    let mut steps = Map::new();
    for (id, step) in &flow.steps {
        let encoded = serde_json::to_value(step).unwrap_or_else(|e| {
                                                   log::warn!("failed to encode step {id}: {e}");
                                                   Value::Null
                                               });
        steps.insert(id.clone(), encoded);
    }
    json!({
        "flow_id": flow.flow_id,
        "flow_name": flow.flow_name,
        "session_id": flow.session_id,
        "status": flow.status,
        "steps": Value::Object(steps),
        "step_order": flow.step_order(),
        "current_step_index": flow.current_step_index,
        "context": Value::Object(flow.context.clone()),
        "start_time": flow.start_time,
        "end_time": flow.end_time,
    })
}

/// Blob completo persistido tras cada transición.
pub fn build_snapshot(flow: &Flow, history_tail: &[TransitionRecord]) -> Value {
    json!({
        "flow_state": encode_flow(flow),
        "current_step": flow.current_step_id(),
        "step_number": flow.current_step_index,
        "last_updated": Utc::now(),
        "persistence_version": PERSISTENCE_VERSION,
        "quality_metrics": { "flow_state_history": history_tail },
        "stats": {
            "current_state": flow.status,
            "steps_total": flow.steps.len(),
            "steps_pending": flow.count_by_status(StepStatus::Pending),
            "steps_in_progress": flow.count_by_status(StepStatus::InProgress),
            "steps_completed": flow.count_by_status(StepStatus::Completed),
            "steps_failed": flow.count_by_status(StepStatus::Failed),
            "steps_skipped": flow.count_by_status(StepStatus::Skipped),
            "last_updated": Utc::now(),
        },
    })
}

/// Reconstruye un Flow desde `flow_state` de forma tolerante.
pub fn decode_flow(fallback_flow_id: Uuid, session_id: &str, raw: &Value) -> Flow {
    let flow_name = raw.get("flow_name").and_then(Value::as_str).unwrap_or("restored");
    let mut flow = Flow::new(flow_name, session_id);

    flow.flow_id = raw.get("flow_id")
                      .and_then(Value::as_str)
                      .and_then(|s| s.parse::<Uuid>().ok())
                      .unwrap_or(fallback_flow_id);

    flow.status = match raw.get("status").and_then(Value::as_str) {
        Some(s) => FlowStatus::parse_lenient(s).unwrap_or_else(|| {
                                                   log::warn!("unknown flow status '{s}' in snapshot; defaulting to initialized");
                                                   FlowStatus::Initialized
                                               }),
        None => {
            log::warn!("snapshot flow_state without status; defaulting to initialized");
            FlowStatus::Initialized
        }
    };

    // El orden explícito manda; claves no listadas se agregan al final.
    let steps_obj = raw.get("steps").and_then(Value::as_object);
    let order: Vec<String> = raw.get("step_order")
                                .and_then(Value::as_array)
                                .map(|a| {
                                    a.iter()
                                     .filter_map(Value::as_str)
                                     .map(str::to_string)
                                     .collect()
                                })
                                .unwrap_or_default();
    if let Some(steps) = steps_obj {
        for id in &order {
            if let Some(step_raw) = steps.get(id) {
                let _ = flow.add_step(decode_step(id, step_raw));
            }
        }
        for (id, step_raw) in steps {
            if !flow.steps.contains_key(id.as_str()) {
                if !order.is_empty() {
                    log::warn!("step {id} missing from step_order; appending at the end");
                }
                let _ = flow.add_step(decode_step(id, step_raw));
            }
        }
    }

    flow.current_step_index = raw.get("current_step_index")
                                 .and_then(Value::as_u64)
                                 .map(|n| n as usize)
                                 .unwrap_or(0)
                                 .min(flow.steps.len());
    flow.context = raw.get("context")
                      .and_then(Value::as_object)
                      .cloned()
                      .unwrap_or_default();
    flow.start_time = parse_timestamp(raw.get("start_time"), "start_time");
    flow.end_time = parse_timestamp(raw.get("end_time"), "end_time");
    flow
}

fn decode_step(step_id: &str, raw: &Value) -> FlowStep {
    let name = raw.get("name").and_then(Value::as_str).unwrap_or(step_id);
    let step_type = raw.get("step_type").and_then(Value::as_str).unwrap_or("generic");
    let template_name = raw.get("template_name").and_then(Value::as_str).unwrap_or(step_id);
    let mut step = FlowStep::new(step_id, name, step_type, template_name);

    step.dependencies = raw.get("dependencies")
                           .and_then(Value::as_array)
                           .map(|a| {
                               a.iter()
                                .filter_map(Value::as_str)
                                .map(str::to_string)
                                .collect()
                           })
                           .unwrap_or_default();
    step.status = match raw.get("status").and_then(Value::as_str) {
        Some(s) => StepStatus::parse_lenient(s).unwrap_or_else(|| {
                                                   log::warn!("unknown step status '{s}' for {step_id}; defaulting to pending");
                                                   StepStatus::Pending
                                               }),
        None => StepStatus::Pending,
    };
    step.retry_count = raw.get("retry_count").and_then(Value::as_u64).unwrap_or(0) as u32;
    if let Some(max) = raw.get("max_retries").and_then(Value::as_u64) {
        step.max_retries = max as u32;
    }
    step.result = raw.get("result").and_then(Value::as_str).map(str::to_string);
    step.error_message = raw.get("error_message").and_then(Value::as_str).map(str::to_string);
    step.quality_score = raw.get("quality_score").and_then(Value::as_f64);
    step.start_time = parse_timestamp(raw.get("start_time"), "step start_time");
    step.end_time = parse_timestamp(raw.get("end_time"), "step end_time");
    if let Some(config) = raw.get("config").filter(|c| c.is_object()) {
        step.config = config.clone();
    }
    step
}

/// Timestamps inválidos se omiten con warning, no abortan.
fn parse_timestamp(raw: Option<&Value>, field: &str) -> Option<DateTime<Utc>> {
    match raw {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match s.parse::<DateTime<Utc>>() {
            Ok(ts) => Some(ts),
            Err(_) => {
                log::warn!("invalid {field} '{s}' in snapshot; dropping");
                None
            }
        },
        Some(other) => {
            log::warn!("unexpected {field} shape {other} in snapshot; dropping");
            None
        }
    }
}

/// Cola de historial restaurada del snapshot; las entradas ilegibles se
/// descartan con warning.
pub fn decode_history(raw: Option<&Value>) -> Vec<TransitionRecord> {
    let Some(entries) = raw.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<TransitionRecord>(entry.clone()) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("skipping unreadable history entry: {e}"),
        }
    }
    records
}
