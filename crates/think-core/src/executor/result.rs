//! Resultados estructurados del executor.
//!
//! El sistema nunca invoca un modelo: `template_content` es la instrucción
//! emitida para que un caller externo la ejecute. Para steps for-each el
//! resultado agrega una lista ordenada por `iteration_index`.

use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    /// For-each con al menos una iteración fallida (con `continue_on_error`).
    Partial,
}

/// Resultado de ejecutar (resolver) un step.
#[derive(Debug, Clone, Serialize)]
pub struct StepExecution {
    pub execution_id: Uuid,
    pub flow_id: Uuid,
    pub step_id: String,
    pub template_name: String,
    /// Contenido renderizado; para for-each, la lista agregada serializada.
    pub template_content: String,
    /// Contexto fusionado efectivo (flow + llamada).
    pub context: Map<String, Value>,
    pub status: ExecutionStatus,
    pub execution_time_ms: u64,
    /// Presente sólo en steps for-each; ordenada por `iteration_index`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iterations: Option<Vec<IterationOutcome>>,
}

/// Una iteración de un step for-each.
#[derive(Debug, Clone, Serialize)]
pub struct IterationOutcome {
    pub iteration_index: usize,
    pub iteration_item: Value,
    /// Id sintetizado `"{step_id}_iter_{i}"`.
    pub step_id: String,
    pub result: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub step_id: String,
    pub error: String,
}

/// Resumen de `execute_flow`. `steps_*` cuentan a nivel de step agregado (un
/// for-each cuenta una sola vez); las fallas por iteración se listan en
/// `failures` con su id sintetizado.
#[derive(Debug, Clone, Serialize)]
pub struct FlowRunSummary {
    pub flow_id: Uuid,
    pub status: ExecutionStatus,
    pub steps_executed: usize,
    pub steps_succeeded: usize,
    pub steps_failed: usize,
    pub failures: Vec<StepFailure>,
    #[serde(skip)]
    pub executions: Vec<StepExecution>,
}
