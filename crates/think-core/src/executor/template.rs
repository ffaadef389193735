//! Resolución determinista de plantillas.
//!
//! Orden de resolución del nombre:
//! 1. override `template` en la config del step (se usa textual);
//! 2. variante por complejidad `"{base}_{complexity}"` si el contexto trae
//!    `complexity` y el provider la conoce (`has_template`, único probe);
//! 3. el `template_name` base.
//!
//! Los parámetros son la unión de los escalares del contexto fusionado y de
//! la config del step (sin la clave `template`); la config gana ante colisión.

use serde_json::{Map, Value};

use crate::gateway::TemplateProvider;
use crate::model::FlowStep;

/// Merge shallow de contextos: las claves de la llamada pisan a las del flow.
pub fn merge_context(flow_context: &Map<String, Value>, call_context: &Map<String, Value>) -> Map<String, Value> {
    let mut out = flow_context.clone();
    for (k, v) in call_context {
        out.insert(k.clone(), v.clone());
    }
    out
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_))
}

pub fn resolve_template_name<T: TemplateProvider + ?Sized>(templates: &T,
                                                           step: &FlowStep,
                                                           merged_context: &Map<String, Value>)
                                                           -> String {
    if let Some(over) = step.template_override() {
        return over.to_string();
    }
    if let Some(complexity) = merged_context.get("complexity").and_then(Value::as_str) {
        let variant = format!("{}_{}", step.template_name, complexity);
        if templates.has_template(&variant) {
            return variant;
        }
    }
    step.template_name.clone()
}

pub fn template_params(step: &FlowStep, merged_context: &Map<String, Value>) -> Map<String, Value> {
    let mut params = Map::new();
    for (k, v) in merged_context {
        if is_scalar(v) {
            params.insert(k.clone(), v.clone());
        }
    }
    if let Value::Object(config) = &step.config {
        for (k, v) in config {
            if k != "template" && is_scalar(v) {
                params.insert(k.clone(), v.clone());
            }
        }
    }
    params
}
