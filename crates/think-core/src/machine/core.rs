//! Motor de transiciones: valida eventos contra la tabla, registra historial,
//! ejecuta efectos secundarios con rollback y persiste snapshots best-effort.
//!
//! Reglas de oro:
//! - El historial se escribe ANTES de mutar `flow.status` (la intención queda
//!   capturada aunque un efecto falle).
//! - Si un efecto secundario falla, el estado se revierte, se agrega una
//!   entrada `failed_transition=true` y se devuelve `FlowState`.
//! - Un efecto con resultado parcial (bool) produce warning, no falla: la
//!   falla de un step no es, por sí sola, una falla de transición.
//! - La persistencia nunca es fatal: se loguea y se continúa.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use uuid::Uuid;

use crate::errors::FlowCoreError;
use crate::gateway::PersistenceGateway;
use crate::machine::event::FlowEvent;
use crate::machine::history::{TransitionHistory, TransitionRecord};
use crate::machine::table;
use crate::model::{Flow, FlowStatus};
use crate::recovery::snapshot;

/// Evento de seguimiento producido por un efecto secundario (auto-complete o
/// escalamiento de falla crítica). Se aplica una única vez, nunca en cascada.
type FollowUp = Option<(FlowEvent, Value)>;

pub struct FlowStateMachine {
    history: TransitionHistory,
    /// Índice de flows pausados -> timestamp de pausa (para barridos de
    /// timeout por polling; no hay reloj interno).
    paused_since: HashMap<Uuid, DateTime<Utc>>,
    gateway: Option<Box<dyn PersistenceGateway>>,
}

impl FlowStateMachine {
    pub fn new(history: TransitionHistory) -> Self {
        Self { history,
               paused_since: HashMap::new(),
               gateway: None }
    }

    /// Conecta el gateway de persistencia (snapshots tras cada transición).
    pub fn with_gateway(mut self, gateway: Box<dyn PersistenceGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    pub fn history(&self) -> &TransitionHistory {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut TransitionHistory {
        &mut self.history
    }

    /// Timestamp de pausa registrado para un flow, si está pausado.
    pub fn paused_since(&self, flow_id: Uuid) -> Option<DateTime<Utc>> {
        self.paused_since.get(&flow_id).copied()
    }

    /// Barrido de timeouts: flows pausados hace al menos `threshold`. El
    /// caller decide qué evento emitir (`Timeout`, `Cancel`, ...).
    pub fn check_for_timeouts(&self, threshold: Duration) -> Vec<Uuid> {
        let now = Utc::now();
        self.paused_since
            .iter()
            .filter(|(_, since)| now - **since >= threshold)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Barrido de limpieza del historial.
    pub fn cleanup_history(&mut self, max_age: Duration) {
        self.history.cleanup(max_age);
    }

    /// Aplica `event` sobre `flow` con los `metadata` dados y devuelve el
    /// estado resultante.
    pub fn transition(&mut self, flow: &mut Flow, event: FlowEvent, metadata: Value) -> Result<FlowStatus, FlowCoreError> {
        self.transition_inner(flow, event, metadata, 0)
    }

    fn transition_inner(&mut self,
                        flow: &mut Flow,
                        event: FlowEvent,
                        metadata: Value,
                        depth: u8)
                        -> Result<FlowStatus, FlowCoreError> {
        let now = Utc::now();
        let mut meta = normalize_metadata(metadata);
        if !meta.contains_key("timestamp") {
            meta.insert("timestamp".into(), json!(now.to_rfc3339()));
        }

        let from = flow.status;

        // Validación contra la tabla, con los dos escapes.
        let target = match table::next_state(from, event) {
            Some(t) => t,
            None => match event {
                FlowEvent::ManualOverride => {
                    let target = meta.get("target_state")
                                     .and_then(Value::as_str)
                                     .and_then(FlowStatus::parse_lenient)
                                     .ok_or(FlowCoreError::InvalidTransition { flow_id: flow.flow_id,
                                                                               current_state: from,
                                                                               event })?;
                    meta.insert("forced".into(), json!(true));
                    log::warn!("forced transition {from} -> {target} on flow {}", flow.flow_id);
                    target
                }
                FlowEvent::Error => FlowStatus::Failed,
                _ => {
                    return Err(FlowCoreError::InvalidTransition { flow_id: flow.flow_id,
                                                                  current_state: from,
                                                                  event })
                }
            },
        };

        // Historial antes de mutar.
        let duration = self.history.seconds_in_state(flow.flow_id, from, now);
        self.history.append(flow.flow_id,
                            TransitionRecord { timestamp: now,
                                               from_state: from,
                                               to_state: target,
                                               event,
                                               metadata: Value::Object(meta.clone()),
                                               duration_seconds: duration });

        // Mutación + índice de pausados.
        let paused_at = self.paused_since.get(&flow.flow_id).copied();
        flow.status = target;
        if target == FlowStatus::Paused {
            self.paused_since.insert(flow.flow_id, now);
        } else {
            self.paused_since.remove(&flow.flow_id);
        }

        // Efectos secundarios, con rollback del estado ante falla.
        let mut follow_up: FollowUp = None;
        match apply_side_effects(flow, event, target, &meta, now, paused_at, &mut follow_up) {
            Ok(true) => {}
            Ok(false) => {
                log::warn!("side effects reported partial result on flow {} (event {event})", flow.flow_id);
            }
            Err(reason) => {
                flow.status = from;
                if target == FlowStatus::Paused {
                    self.paused_since.remove(&flow.flow_id);
                }
                if from == FlowStatus::Paused {
                    self.paused_since.insert(flow.flow_id, paused_at.unwrap_or(now));
                }
                let mut failed_meta = meta;
                failed_meta.insert("failed_transition".into(), json!(true));
                self.history.append(flow.flow_id,
                                    TransitionRecord { timestamp: Utc::now(),
                                                       from_state: target,
                                                       to_state: from,
                                                       event,
                                                       metadata: Value::Object(failed_meta),
                                                       duration_seconds: None });
                return Err(FlowCoreError::FlowState { flow_id: flow.flow_id,
                                                      current_state: from,
                                                      reason });
            }
        }

        self.persist_snapshot(flow);

        // Evento de seguimiento acotado a un nivel (nunca cascada).
        if depth == 0 {
            if let Some((next_event, next_meta)) = follow_up {
                return self.transition_inner(flow, next_event, next_meta, 1);
            }
        }

        Ok(flow.status)
    }

    fn persist_snapshot(&self, flow: &Flow) {
        let Some(gateway) = self.gateway.as_ref() else { return };
        let tail = self.history.tail(flow.flow_id, crate::constants::HISTORY_TAIL_PERSISTED);
        let blob = snapshot::build_snapshot(flow, &tail);
        if !gateway.save(&flow.session_id, &blob) {
            log::warn!("snapshot persistence failed for flow {} (session {}); continuing in memory",
                       flow.flow_id,
                       flow.session_id);
        }
    }
}

impl Default for FlowStateMachine {
    fn default() -> Self {
        Self::new(TransitionHistory::default())
    }
}

/// Garantiza un objeto de metadata (los valores sueltos se envuelven).
fn normalize_metadata(metadata: Value) -> Map<String, Value> {
    match metadata {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".into(), other);
            map
        }
    }
}

fn meta_str<'a>(meta: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    meta.get(key).and_then(Value::as_str)
}

fn meta_bool(meta: &Map<String, Value>, key: &str) -> bool {
    meta.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// `result` puede venir como string o como JSON arbitrario; se almacena texto.
fn meta_result(meta: &Map<String, Value>, key: &str) -> Option<String> {
    match meta.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

/// Efectos por (evento, estado destino). Devuelve `Ok(false)` ante resultados
/// parciales (warning) y `Err(reason)` ante fallas que exigen rollback.
fn apply_side_effects(flow: &mut Flow,
                      event: FlowEvent,
                      target: FlowStatus,
                      meta: &Map<String, Value>,
                      now: DateTime<Utc>,
                      paused_at: Option<DateTime<Utc>>,
                      follow_up: &mut FollowUp)
                      -> Result<bool, String> {
    let mut fully_ok = true;

    match event {
        FlowEvent::Start => {
            if flow.start_time.is_none() {
                flow.start_time = Some(now);
            }
        }
        FlowEvent::Resume => match paused_at {
            Some(since) => {
                let paused_secs = (now - since).num_milliseconds() as f64 / 1000.0;
                log::info!("flow {} resumed after {paused_secs:.1}s paused", flow.flow_id);
            }
            None => {
                log::warn!("flow {} resumed without a pause marker", flow.flow_id);
                fully_ok = false;
            }
        },
        FlowEvent::Recover => {
            if let Some(step_id) = meta_str(meta, "error_step") {
                match flow.steps.get_mut(step_id) {
                    Some(step) => step.reset_for_retry(),
                    None => {
                        log::warn!("recover named unknown step {step_id} on flow {}", flow.flow_id);
                        fully_ok = false;
                    }
                }
            }
        }
        FlowEvent::CompleteStep => {
            let step_id = meta_str(meta, "step_id").ok_or("complete_step requires metadata.step_id")?;
            let result = meta_result(meta, "result");
            let quality = meta.get("quality_score").and_then(Value::as_f64);
            let step = flow.steps
                           .get_mut(step_id)
                           .ok_or_else(|| format!("complete_step named unknown step {step_id}"))?;
            step.mark_completed(result, quality);
            if flow.all_steps_settled() {
                *follow_up = Some((FlowEvent::Complete, json!({ "auto_completed": true })));
            }
        }
        FlowEvent::FailStep => {
            let step_id = meta_str(meta, "step_id").ok_or("fail_step requires metadata.step_id")?;
            let error_message = meta_result(meta, "error_message");
            let critical = meta_bool(meta, "critical");
            let step = flow.steps
                           .get_mut(step_id)
                           .ok_or_else(|| format!("fail_step named unknown step {step_id}"))?;
            step.mark_failed(error_message.clone());
            if critical && !step.can_retry() {
                *follow_up = Some((FlowEvent::Error,
                                   json!({
                                       "failed_step": step_id,
                                       "error_message": error_message,
                                   })));
            }
        }
        FlowEvent::RetryStep => {
            let step_id = meta_str(meta, "step_id").ok_or("retry_step requires metadata.step_id")?;
            let step = flow.steps
                           .get_mut(step_id)
                           .ok_or_else(|| format!("retry_step named unknown step {step_id}"))?;
            if !step.can_retry() {
                return Err(format!("step {step_id} is not retryable (status {}, {}/{} retries)",
                                   step.status, step.retry_count, step.max_retries));
            }
            step.reset_for_retry();
        }
        FlowEvent::SkipStep => {
            let step_id = meta_str(meta, "step_id").ok_or("skip_step requires metadata.step_id")?;
            let step = flow.steps
                           .get_mut(step_id)
                           .ok_or_else(|| format!("skip_step named unknown step {step_id}"))?;
            step.mark_skipped();
        }
        FlowEvent::QualityCheckPass | FlowEvent::QualityCheckFail => {
            if let Some(step_id) = meta_str(meta, "step_id") {
                match flow.steps.get_mut(step_id) {
                    Some(step) => {
                        if let Some(score) = meta.get("quality_score").and_then(Value::as_f64) {
                            step.quality_score = Some(score);
                        }
                    }
                    None => {
                        log::warn!("quality check named unknown step {step_id} on flow {}", flow.flow_id);
                        fully_ok = false;
                    }
                }
            }
        }
        _ => {}
    }

    match target {
        FlowStatus::Completed => {
            flow.end_time = Some(now);
            if let Some(start) = flow.start_time {
                let total_secs = (now - start).num_milliseconds() as f64 / 1000.0;
                log::info!("flow {} completed in {total_secs:.1}s", flow.flow_id);
            }
        }
        FlowStatus::Failed => {
            flow.end_time = Some(now);
            if let Some(message) = meta_result(meta, "error_message") {
                flow.context.insert("error_message".into(), json!(message));
            }
        }
        FlowStatus::Cancelled => {
            flow.end_time = Some(now);
            if let Some(reason) = meta_str(meta, "reason") {
                flow.context.insert("cancel_reason".into(), json!(reason));
            }
        }
        FlowStatus::Initialized => {
            if event == FlowEvent::Reset {
                flow.reset();
            }
        }
        // El marcador de pausa lo administra el motor (índice paused_since).
        FlowStatus::Running | FlowStatus::Paused => {}
    }

    Ok(fully_ok)
}
