//! Entidad Step: unidad de trabajo con dependencias y sub-estado propio.
//!
//! Un step queda ligado a una plantilla (`template_name`) y a un conjunto de
//! dependencias (ids de steps que deben estar `Completed` antes de que este
//! sea seleccionable). El sub-estado muta únicamente a través de los métodos
//! `mark_*` / `reset*`; la falla de un step no es una excepción sino un dato
//! (status `Failed` + presupuesto de reintentos).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::DEFAULT_MAX_RETRIES;

/// Sub-estado de un step.
///
/// Transiciones válidas:
/// - `Pending` -> `InProgress`
/// - `InProgress` -> `Completed` | `Failed`
/// - `Failed` -> `Pending` (retry, sólo con presupuesto disponible)
/// - cualquiera -> `Skipped` (decisión explícita del caller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    /// Parser tolerante usado en restauración: `None` ante valores extraños.
    pub fn parse_lenient(raw: &str) -> Option<StepStatus> {
        match raw {
            "pending" => Some(StepStatus::Pending),
            "in_progress" => Some(StepStatus::InProgress),
            "completed" => Some(StepStatus::Completed),
            "failed" => Some(StepStatus::Failed),
            "skipped" => Some(StepStatus::Skipped),
            _ => None,
        }
    }

    /// `true` si el step ya no requiere ejecución (terminó bien o fue saltado).
    pub fn is_settled(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Skipped)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Un step dentro de un Flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowStep {
    /// Identificador estable y único dentro del Flow.
    pub step_id: String,
    pub name: String,
    /// Categoría libre (ej. "decomposition", "evidence", "evaluation").
    pub step_type: String,
    /// Nombre base de la plantilla; la resolución final puede elegir una
    /// variante por complejidad o un override de `config`.
    pub template_name: String,
    pub dependencies: Vec<String>,
    pub status: StepStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Salida opaca del step (texto; usualmente JSON emitido por el caller).
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub quality_score: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Configuración por step: override `template`, referencia `for_each`
    /// ("<source_step>.<campo>") y parámetros extra para la plantilla.
    pub config: Value,
}

impl FlowStep {
    pub fn new(step_id: impl Into<String>,
               name: impl Into<String>,
               step_type: impl Into<String>,
               template_name: impl Into<String>)
               -> Self {
        Self { step_id: step_id.into(),
               name: name.into(),
               step_type: step_type.into(),
               template_name: template_name.into(),
               dependencies: Vec::new(),
               status: StepStatus::Pending,
               retry_count: 0,
               max_retries: DEFAULT_MAX_RETRIES,
               result: None,
               error_message: None,
               quality_score: None,
               start_time: None,
               end_time: None,
               config: Value::Object(Map::new()) }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Un step `Failed` sólo es reintetable mientras quede presupuesto.
    pub fn can_retry(&self) -> bool {
        self.status == StepStatus::Failed && self.retry_count < self.max_retries
    }

    /// Override de plantilla declarado en `config` (se usa textual).
    pub fn template_override(&self) -> Option<&str> {
        self.config.get("template").and_then(Value::as_str)
    }

    /// Referencia for-each declarada en `config`.
    pub fn for_each_ref(&self) -> Option<&str> {
        self.config.get("for_each").and_then(Value::as_str)
    }

    pub fn mark_in_progress(&mut self) {
        self.status = StepStatus::InProgress;
        self.start_time = Some(Utc::now());
        self.end_time = None;
    }

    pub fn mark_completed(&mut self, result: Option<String>, quality_score: Option<f64>) {
        self.status = StepStatus::Completed;
        self.result = result;
        if quality_score.is_some() {
            self.quality_score = quality_score;
        }
        self.error_message = None;
        self.end_time = Some(Utc::now());
    }

    /// Marca la falla y consume una unidad del presupuesto de reintentos.
    pub fn mark_failed(&mut self, error_message: Option<String>) {
        self.status = StepStatus::Failed;
        self.retry_count += 1;
        self.error_message = error_message;
        self.end_time = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self) {
        self.status = StepStatus::Skipped;
        self.end_time = Some(Utc::now());
    }

    /// Vuelve a `Pending` conservando el contador de reintentos (usado por
    /// `RetryStep` y por la recuperación de un step con error).
    pub fn reset_for_retry(&mut self) {
        self.status = StepStatus::Pending;
        self.error_message = None;
        self.end_time = None;
    }

    /// Reset completo (usado por `Reset` a nivel de flow).
    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.retry_count = 0;
        self.result = None;
        self.error_message = None;
        self.quality_score = None;
        self.start_time = None;
        self.end_time = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_budget_is_bounded() {
        let mut step = FlowStep::new("s1", "step one", "generic", "tpl");
        assert!(!step.can_retry(), "pending step is not retryable");

        step.mark_failed(Some("boom".into()));
        assert!(step.can_retry());
        step.mark_failed(None);
        step.mark_failed(None);
        assert_eq!(step.retry_count, 3);
        assert!(!step.can_retry(), "budget exhausted after max_retries failures");
    }

    #[test]
    fn reset_clears_everything_retry_keeps_count() {
        let mut step = FlowStep::new("s1", "step one", "generic", "tpl");
        step.mark_in_progress();
        step.mark_failed(Some("x".into()));

        step.reset_for_retry();
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.retry_count, 1, "retry keeps the counter");
        assert!(step.error_message.is_none());

        step.mark_failed(None);
        step.reset();
        assert_eq!(step.retry_count, 0, "full reset zeroes the counter");
        assert!(step.start_time.is_none() && step.end_time.is_none());
    }

    #[test]
    fn config_accessors() {
        let step = FlowStep::new("s1", "s", "t", "base").with_config(serde_json::json!({
                                                            "template": "custom_tpl",
                                                            "for_each": "prev.items",
                                                        }));
        assert_eq!(step.template_override(), Some("custom_tpl"));
        assert_eq!(step.for_each_ref(), Some("prev.items"));
    }
}
