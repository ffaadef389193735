//! Agregado Flow: colección ordenada de steps + estado de flujo + contexto.
//!
//! Invariantes:
//! - Toda dependencia referenciada existe en `steps` y el grafo es acíclico
//!   (validado en `validate`, que la materialización invoca siempre).
//! - `status` muta únicamente a través del state machine; los campos son
//!   públicos por ergonomía pero ese es el contrato de uso.
//! - El orden de `steps` (IndexMap de inserción) ES el `step_order`; la
//!   selección del siguiente step es determinista dado el estado actual.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::errors::FlowCoreError;
use crate::model::progress::FlowProgress;
use crate::model::step::{FlowStep, StepStatus};

/// Estado de un Flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Initialized,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Initialized => "initialized",
            FlowStatus::Running => "running",
            FlowStatus::Paused => "paused",
            FlowStatus::Completed => "completed",
            FlowStatus::Failed => "failed",
            FlowStatus::Cancelled => "cancelled",
        }
    }

    /// Parser tolerante: `None` ante strings desconocidos (la restauración
    /// degrada a `Initialized` con warning, no falla).
    pub fn parse_lenient(raw: &str) -> Option<FlowStatus> {
        match raw {
            "initialized" => Some(FlowStatus::Initialized),
            "running" => Some(FlowStatus::Running),
            "paused" => Some(FlowStatus::Paused),
            "completed" => Some(FlowStatus::Completed),
            "failed" => Some(FlowStatus::Failed),
            "cancelled" => Some(FlowStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FlowStatus::Completed | FlowStatus::Failed | FlowStatus::Cancelled)
    }
}

impl std::fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raíz del agregado: un flujo de pensamiento ligado a una sesión.
#[derive(Debug, Clone)]
pub struct Flow {
    pub flow_id: Uuid,
    pub flow_name: String,
    /// Clave foránea hacia el registro de sesión externo; también es la clave
    /// bajo la cual se persisten los snapshots.
    pub session_id: String,
    pub status: FlowStatus,
    /// step_id -> step; el orden de inserción es el orden del pipeline.
    pub steps: IndexMap<String, FlowStep>,
    /// Puntero dentro del orden de steps; monótono no-decreciente salvo
    /// reset/rollback explícitos.
    pub current_step_index: usize,
    /// Claves arbitrarias para binding de plantillas y flags de recuperación
    /// (`needs_recovery`, `rollback_history`, ...).
    pub context: Map<String, Value>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Flow {
    pub fn new(flow_name: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self { flow_id: Uuid::new_v4(),
               flow_name: flow_name.into(),
               session_id: session_id.into(),
               status: FlowStatus::Initialized,
               steps: IndexMap::new(),
               current_step_index: 0,
               context: Map::new(),
               start_time: None,
               end_time: None }
    }

    /// Agrega un step al final del pipeline. Falla si el id ya existe.
    pub fn add_step(&mut self, step: FlowStep) -> Result<(), FlowCoreError> {
        if self.steps.contains_key(&step.step_id) {
            return Err(FlowCoreError::DuplicateStep { step_id: step.step_id.clone() });
        }
        self.steps.insert(step.step_id.clone(), step);
        Ok(())
    }

    /// Ids de steps en orden de pipeline.
    pub fn step_order(&self) -> Vec<&str> {
        self.steps.keys().map(|k| k.as_str()).collect()
    }

    /// Id del step apuntado por `current_step_index`, si existe.
    pub fn current_step_id(&self) -> Option<&str> {
        self.steps
            .get_index(self.current_step_index)
            .map(|(id, _)| id.as_str())
    }

    /// Dependencias del step que todavía no están `Completed`.
    pub fn missing_dependencies(&self, step: &FlowStep) -> Vec<String> {
        step.dependencies
            .iter()
            .filter(|dep| {
                self.steps
                    .get(dep.as_str())
                    .map(|d| d.status != StepStatus::Completed)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }

    pub fn dependencies_satisfied(&self, step: &FlowStep) -> bool {
        self.missing_dependencies(step).is_empty()
    }

    /// Selección determinista del siguiente step ejecutable.
    ///
    /// Recorre el orden del pipeline desde `current_step_index`:
    /// - `Completed`/`Skipped` se saltan;
    /// - el primer `Pending` con dependencias completas gana;
    /// - un `Pending` bloqueado detiene el barrido (semántica de pipeline:
    ///   un step bloqueado oculta steps posteriores aunque sean independientes);
    /// - un `Failed` con `can_retry()` es elegible en su posición original;
    /// - cualquier otro caso (`InProgress`, `Failed` agotado) detiene el
    ///   barrido sin resultado.
    pub fn get_next_step(&self) -> Option<&FlowStep> {
        for idx in self.current_step_index..self.steps.len() {
            let (_, step) = self.steps.get_index(idx)?;
            match step.status {
                StepStatus::Completed | StepStatus::Skipped => continue,
                StepStatus::Pending => {
                    if self.dependencies_satisfied(step) {
                        return Some(step);
                    }
                    return None;
                }
                StepStatus::Failed if step.can_retry() => return Some(step),
                _ => return None,
            }
        }
        None
    }

    /// Avanza el puntero del pipeline (para saltar un step ya terminal).
    pub fn advance_step(&mut self) {
        if self.current_step_index < self.steps.len() {
            self.current_step_index += 1;
        }
    }

    /// `true` cuando todos los steps quedaron `Completed` o `Skipped`.
    pub fn all_steps_settled(&self) -> bool {
        !self.steps.is_empty() && self.steps.values().all(|s| s.status.is_settled())
    }

    pub fn count_by_status(&self, status: StepStatus) -> usize {
        self.steps.values().filter(|s| s.status == status).count()
    }

    /// Vista derivada del avance del flujo; sin efectos.
    pub fn get_progress(&self) -> FlowProgress {
        let total = self.steps.len();
        let completed = self.count_by_status(StepStatus::Completed);
        let failed = self.count_by_status(StepStatus::Failed);
        let skipped = self.count_by_status(StepStatus::Skipped);
        let percent = if total == 0 {
            0.0
        } else {
            completed as f64 * 100.0 / total as f64
        };
        let elapsed = self.start_time.map(|s| {
                                         let end = self.end_time.unwrap_or_else(Utc::now);
                                         (end - s).num_milliseconds() as f64 / 1000.0
                                     });
        FlowProgress { flow_id: self.flow_id,
                       flow_name: self.flow_name.clone(),
                       status: self.status,
                       total_steps: total,
                       completed_steps: completed,
                       failed_steps: failed,
                       skipped_steps: skipped,
                       percent_complete: percent,
                       current_step: self.current_step_id().map(str::to_string),
                       elapsed_seconds: elapsed }
    }

    /// Valida los invariantes estructurales: dependencias existentes y grafo
    /// acíclico. Se invoca al materializar una definición.
    pub fn validate(&self) -> Result<(), FlowCoreError> {
        for step in self.steps.values() {
            for dep in &step.dependencies {
                if !self.steps.contains_key(dep.as_str()) {
                    return Err(FlowCoreError::UnknownDependency { step_id: step.step_id.clone(),
                                                                  dependency: dep.clone() });
                }
            }
        }
        // DFS tricolor sobre el grafo de dependencias.
        let mut state: IndexMap<&str, u8> = self.steps.keys().map(|k| (k.as_str(), 0u8)).collect();
        for id in self.steps.keys() {
            self.visit_for_cycles(id, &mut state)?;
        }
        Ok(())
    }

    fn visit_for_cycles<'a>(&'a self, id: &'a str, state: &mut IndexMap<&'a str, u8>) -> Result<(), FlowCoreError> {
        match state.get(id).copied() {
            Some(1) => return Err(FlowCoreError::DependencyCycle { step_id: id.to_string() }),
            Some(2) => return Ok(()),
            _ => {}
        }
        state.insert(id, 1);
        if let Some(step) = self.steps.get(id) {
            for dep in &step.dependencies {
                self.visit_for_cycles(dep.as_str(), state)?;
            }
        }
        state.insert(id, 2);
        Ok(())
    }

    /// Reset completo del agregado (evento `Reset`): todos los steps vuelven a
    /// `Pending` con contadores en cero y los timestamps se limpian. El
    /// contexto se conserva salvo los flags de recuperación.
    pub fn reset(&mut self) {
        for step in self.steps.values_mut() {
            step.reset();
        }
        self.current_step_index = 0;
        self.start_time = None;
        self.end_time = None;
        self.context.remove("needs_recovery");
        self.context.remove("recovery_timestamp");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_step_flow() -> Flow {
        // A sin dependencias, B depende de A
        let mut flow = Flow::new("test", "session-1");
        flow.add_step(FlowStep::new("a", "A", "generic", "tpl_a")).unwrap();
        flow.add_step(FlowStep::new("b", "B", "generic", "tpl_b").with_dependencies(vec!["a".into()]))
            .unwrap();
        flow
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let mut flow = two_step_flow();
        let err = flow.add_step(FlowStep::new("a", "A2", "generic", "tpl")).unwrap_err();
        assert!(matches!(err, FlowCoreError::DuplicateStep { .. }));
    }

    #[test]
    fn dependency_gating_never_returns_blocked_step() {
        let mut flow = two_step_flow();
        assert_eq!(flow.get_next_step().map(|s| s.step_id.as_str()), Some("a"));

        // A en progreso: no hay siguiente (B sigue bloqueado)
        flow.steps.get_mut("a").unwrap().mark_in_progress();
        assert!(flow.get_next_step().is_none());

        // A falló sin presupuesto: tampoco
        let a = flow.steps.get_mut("a").unwrap();
        a.max_retries = 1;
        a.mark_failed(Some("x".into()));
        assert!(flow.get_next_step().is_none());

        // A completado: ahora sí B
        flow.steps.get_mut("a").unwrap().mark_completed(None, None);
        assert_eq!(flow.get_next_step().map(|s| s.step_id.as_str()), Some("b"));
    }

    #[test]
    fn failed_step_with_budget_is_eligible_inline() {
        let mut flow = two_step_flow();
        flow.steps.get_mut("a").unwrap().mark_failed(Some("boom".into()));
        assert_eq!(flow.get_next_step().map(|s| s.step_id.as_str()),
                   Some("a"),
                   "retryable failed step stays selectable at its position");
    }

    #[test]
    fn validate_detects_unknown_dependency_and_cycle() {
        let mut flow = Flow::new("bad", "s");
        flow.add_step(FlowStep::new("x", "X", "t", "tpl").with_dependencies(vec!["ghost".into()]))
            .unwrap();
        assert!(matches!(flow.validate(), Err(FlowCoreError::UnknownDependency { .. })));

        let mut cyclic = Flow::new("cyclic", "s");
        cyclic.add_step(FlowStep::new("p", "P", "t", "tpl").with_dependencies(vec!["q".into()]))
              .unwrap();
        cyclic.add_step(FlowStep::new("q", "Q", "t", "tpl").with_dependencies(vec!["p".into()]))
              .unwrap();
        assert!(matches!(cyclic.validate(), Err(FlowCoreError::DependencyCycle { .. })));
    }

    #[test]
    fn progress_is_a_pure_view() {
        let mut flow = two_step_flow();
        flow.steps.get_mut("a").unwrap().mark_completed(None, None);
        let progress = flow.get_progress();
        assert_eq!(progress.total_steps, 2);
        assert_eq!(progress.completed_steps, 1);
        assert!((progress.percent_complete - 50.0).abs() < f64::EPSILON);
        assert_eq!(progress.current_step.as_deref(), Some("a"));
    }
}
