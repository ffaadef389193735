//! Servicio de recuperación: restauración desde snapshot, rollback a un step
//! y checkpoints nombrados.
//!
//! La corrección en memoria es primaria: las operaciones de rollback y
//! checkpoint tienen éxito aunque la escritura al gateway falle (se loguea y
//! se continúa).

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::constants::PERSISTENCE_VERSION;
use crate::errors::FlowCoreError;
use crate::gateway::PersistenceGateway;
use crate::machine::history::TransitionRecord;
use crate::machine::FlowStateMachine;
use crate::model::{Flow, FlowStatus, StepStatus};
use crate::recovery::snapshot;

/// Resultado de una restauración: el Flow reconstruido más la cola de
/// historial que venía en el snapshot.
#[derive(Debug)]
pub struct RestoredFlow {
    pub flow: Flow,
    pub history: Vec<TransitionRecord>,
}

impl RestoredFlow {
    /// Siembra el historial restaurado en un state machine.
    pub fn seed_history(&self, machine: &mut FlowStateMachine) {
        machine.history_mut().seed(self.flow.flow_id, self.history.clone());
    }
}

pub struct RecoveryService<G: PersistenceGateway> {
    gateway: G,
    /// Slots de checkpoint nombrados (estado mutable completo del flow).
    checkpoints: HashMap<String, Value>,
}

impl<G: PersistenceGateway> RecoveryService<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway,
               checkpoints: HashMap::new() }
    }

    /// Reconstruye un Flow desde el blob de sesión persistido.
    ///
    /// - `Ok(None)` si no hay blob o el blob no trae `flow_state`.
    /// - Error sólo ante una versión de snapshot desconocida; el resto de los
    ///   defectos degradan con warning (decodificación defensiva).
    /// - Un flow persistido como `Running` quedó a mitad de ejecución cuando
    ///   el proceso murió: se marca `context.needs_recovery = true` y el
    ///   caller decide cómo retomar (reintentar, rollback o reinicio).
    pub fn restore(&self, flow_id: Uuid, session_id: &str) -> Result<Option<RestoredFlow>, FlowCoreError> {
        let Some(blob) = self.gateway.load(session_id) else {
            return Ok(None);
        };

        let version = blob.get("persistence_version")
                          .and_then(Value::as_u64)
                          .unwrap_or(PERSISTENCE_VERSION);
        if version != PERSISTENCE_VERSION {
            return Err(FlowCoreError::SnapshotVersion { found: version });
        }

        let Some(flow_state) = blob.get("flow_state") else {
            log::warn!("session {session_id} blob has no flow_state; nothing to restore");
            return Ok(None);
        };

        let mut flow = snapshot::decode_flow(flow_id, session_id, flow_state);
        let history = snapshot::decode_history(blob.get("quality_metrics")
                                                   .and_then(|q| q.get("flow_state_history")));

        if flow.status == FlowStatus::Running {
            flow.context.insert("needs_recovery".into(), json!(true));
            flow.context
                .insert("recovery_timestamp".into(), json!(Utc::now().to_rfc3339()));
            log::warn!("flow {} restored mid-execution; marked needs_recovery", flow.flow_id);
        }

        Ok(Some(RestoredFlow { flow, history }))
    }

    /// Descarta el trabajo posterior a `target_step_id` y rebobina el cursor.
    ///
    /// Los steps posteriores al objetivo vuelven a `Pending` (reset completo);
    /// el objetivo conserva su resultado y el cursor queda apuntando al step
    /// siguiente. El evento queda registrado en `context.rollback_history`.
    pub fn rollback_to_step(&self, flow: &mut Flow, target_step_id: &str) -> Result<(), FlowCoreError> {
        let target_idx = flow.steps
                             .get_index_of(target_step_id)
                             .ok_or_else(|| FlowCoreError::StepNotFound { flow_id: flow.flow_id,
                                                                          step_id: target_step_id.to_string() })?;

        let mut discarded: Vec<String> = Vec::new();
        for (idx, (id, step)) in flow.steps.iter_mut().enumerate() {
            if idx > target_idx && step.status != StepStatus::Pending {
                discarded.push(id.clone());
                step.reset();
            }
        }
        flow.current_step_index = flow.current_step_index.min(target_idx + 1);

        let entry = json!({
            "timestamp": Utc::now().to_rfc3339(),
            "target_step": target_step_id,
            "discarded_steps": discarded,
        });
        match flow.context.get_mut("rollback_history") {
            Some(Value::Array(entries)) => entries.push(entry),
            _ => {
                flow.context.insert("rollback_history".into(), json!([entry]));
            }
        }

        self.persist_best_effort(flow);
        Ok(())
    }

    /// Congela el estado mutable completo del flow en un slot nombrado.
    pub fn create_checkpoint(&mut self, name: &str, flow: &Flow) {
        let snap = snapshot::encode_flow(flow);
        self.checkpoints.insert(name.to_string(), snap.clone());
        let key = checkpoint_key(&flow.session_id, name);
        if !self.gateway.save(&key, &snap) {
            log::warn!("checkpoint '{name}' persisted in memory only (gateway write failed)");
        }
    }

    /// Reemplaza los campos mutables del flow con el contenido del slot.
    pub fn restore_checkpoint(&self, name: &str, flow: &mut Flow) -> Result<(), FlowCoreError> {
        let snap = self.checkpoints
                       .get(name)
                       .cloned()
                       .or_else(|| self.gateway.load(&checkpoint_key(&flow.session_id, name)))
                       .ok_or_else(|| FlowCoreError::CheckpointNotFound { name: name.to_string() })?;

        let restored = snapshot::decode_flow(flow.flow_id, &flow.session_id, &snap);
        flow.status = restored.status;
        flow.steps = restored.steps;
        flow.current_step_index = restored.current_step_index;
        flow.context = restored.context;
        flow.start_time = restored.start_time;
        flow.end_time = restored.end_time;
        Ok(())
    }

    pub fn checkpoint_names(&self) -> Vec<&str> {
        self.checkpoints.keys().map(|k| k.as_str()).collect()
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    fn persist_best_effort(&self, flow: &Flow) {
        let blob = snapshot::build_snapshot(flow, &[]);
        if !self.gateway.save(&flow.session_id, &blob) {
            log::warn!("rollback persisted in memory only for flow {} (gateway write failed)",
                       flow.flow_id);
        }
    }
}

fn checkpoint_key(session_id: &str, name: &str) -> String {
    format!("{session_id}::checkpoint::{name}")
}
