//! Errores del núcleo de flujos.
//!
//! Un único enum con variantes estructuradas por tipo de falla (nada de bolsas
//! de detalles sueltos). Tres familias:
//! - Transiciones: `InvalidTransition` (evento fuera de tabla) y `FlowState`
//!   (efecto secundario falló; el estado ya fue revertido).
//! - Ejecución: flow/step inexistente, dependencias incompletas, plantilla
//!   ausente.
//! - Recuperación: versión de snapshot desconocida, checkpoint inexistente.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::machine::FlowEvent;
use crate::model::FlowStatus;

#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowCoreError {
    /// Evento no permitido desde el estado actual (y sin escape aplicable).
    #[error("invalid transition: event {event} not allowed from {current_state} (flow {flow_id})")]
    InvalidTransition {
        flow_id: Uuid,
        current_state: FlowStatus,
        event: FlowEvent,
    },

    /// Un efecto secundario de la transición falló; `flow.status` quedó
    /// revertido al valor previo.
    #[error("transition side effect failed on flow {flow_id} (state {current_state}): {reason}")]
    FlowState {
        flow_id: Uuid,
        current_state: FlowStatus,
        reason: String,
    },

    #[error("flow not found: {flow_id}")]
    FlowNotFound { flow_id: Uuid },

    #[error("step not found: {step_id} (flow {flow_id})")]
    StepNotFound { flow_id: Uuid, step_id: String },

    #[error("step already present: {step_id}")]
    DuplicateStep { step_id: String },

    #[error("step {step_id} references unknown dependency {dependency}")]
    UnknownDependency { step_id: String, dependency: String },

    #[error("dependency cycle detected at step {step_id}")]
    DependencyCycle { step_id: String },

    #[error("dependencies not satisfied for step {step_id}: missing {missing:?}")]
    DependenciesNotSatisfied { step_id: String, missing: Vec<String> },

    #[error("template not found: {template_name}")]
    TemplateMissing { template_name: String },

    #[error("flow definition not registered: {flow_name}")]
    DefinitionNotFound { flow_name: String },

    #[error("unsupported snapshot version: {found}")]
    SnapshotVersion { found: u64 },

    #[error("checkpoint not found: {name}")]
    CheckpointNotFound { name: String },

    #[error("internal: {0}")]
    Internal(String),
}
