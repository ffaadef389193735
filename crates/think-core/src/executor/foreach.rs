//! Expansión for-each: iteración sobre la salida estructurada de un step
//! previo.
//!
//! La resolución de la colección degrada en silencio (lista vacía + warning)
//! ante referencia malformada, step fuente sin salida, JSON ilegible o campo
//! ausente/no-lista. La falla dura queda reservada para las iteraciones en sí.

use serde_json::Value;

use crate::model::Flow;

/// Parsea `"<source_step>.<campo>"`; `None` si la forma no es válida.
pub fn parse_for_each_ref(raw: &str) -> Option<(&str, &str)> {
    let (source, field) = raw.split_once('.')?;
    if source.is_empty() || field.is_empty() {
        return None;
    }
    Some((source, field))
}

/// Id sintetizado de una sub-ejecución.
pub fn iteration_step_id(step_id: &str, index: usize) -> String {
    format!("{step_id}_iter_{index}")
}

/// Resuelve la colección de iteración de un step for-each.
pub fn resolve_iteration_items(flow: &Flow, step_id: &str, raw_ref: &str) -> Vec<Value> {
    let Some((source_id, field)) = parse_for_each_ref(raw_ref) else {
        log::warn!("step {step_id}: malformed for_each reference '{raw_ref}'");
        return Vec::new();
    };
    let Some(source) = flow.steps.get(source_id) else {
        log::warn!("step {step_id}: for_each source '{source_id}' not found");
        return Vec::new();
    };
    let Some(result) = source.result.as_deref() else {
        log::warn!("step {step_id}: for_each source '{source_id}' has no output yet");
        return Vec::new();
    };
    let parsed: Value = match serde_json::from_str(result) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("step {step_id}: for_each source '{source_id}' output is not JSON: {e}");
            return Vec::new();
        }
    };
    match parsed.get(field) {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            log::warn!("step {step_id}: for_each field '{field}' is not an array");
            Vec::new()
        }
        None => {
            log::warn!("step {step_id}: for_each field '{field}' absent in source output");
            Vec::new()
        }
    }
}
