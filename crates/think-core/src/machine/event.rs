//! Vocabulario de eventos del state machine.
//!
//! Los eventos no cargan payload: los datos del disparo (step_id, result,
//! error_message, target_state, ...) viajan en el objeto `metadata` de la
//! transición, que queda registrado tal cual en el historial.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    Start,
    Pause,
    Resume,
    Reset,
    Cancel,
    Timeout,
    CompleteStep,
    FailStep,
    RetryStep,
    SkipStep,
    QualityCheckPass,
    QualityCheckFail,
    /// Escape: fuerza un estado destino explícito (`metadata.target_state`),
    /// registrado como transición forzada.
    ManualOverride,
    /// Escape: siempre legal, fuerza `Failed`.
    Error,
    Recover,
    Complete,
}

impl FlowEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowEvent::Start => "start",
            FlowEvent::Pause => "pause",
            FlowEvent::Resume => "resume",
            FlowEvent::Reset => "reset",
            FlowEvent::Cancel => "cancel",
            FlowEvent::Timeout => "timeout",
            FlowEvent::CompleteStep => "complete_step",
            FlowEvent::FailStep => "fail_step",
            FlowEvent::RetryStep => "retry_step",
            FlowEvent::SkipStep => "skip_step",
            FlowEvent::QualityCheckPass => "quality_check_pass",
            FlowEvent::QualityCheckFail => "quality_check_fail",
            FlowEvent::ManualOverride => "manual_override",
            FlowEvent::Error => "error",
            FlowEvent::Recover => "recover",
            FlowEvent::Complete => "complete",
        }
    }

    /// Eventos con alcance de step: el flujo permanece `Running`.
    pub fn is_step_scoped(&self) -> bool {
        matches!(self,
                 FlowEvent::CompleteStep
                 | FlowEvent::FailStep
                 | FlowEvent::RetryStep
                 | FlowEvent::SkipStep
                 | FlowEvent::QualityCheckPass
                 | FlowEvent::QualityCheckFail)
    }
}

impl std::fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
