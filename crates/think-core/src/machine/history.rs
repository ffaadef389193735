//! Historial de transiciones: append-only por flow_id, con retención acotada.
//!
//! Cada transición registra la tupla (from, to, evento, metadata) ANTES de
//! mutar el estado del flow, de modo que la intención queda capturada aunque
//! los efectos secundarios fallen. `duration_seconds` se calcula contra la
//! entrada más reciente cuyo `to_state` coincide con el `from_state` actual.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::DEFAULT_HISTORY_RETENTION;
use crate::machine::event::FlowEvent;
use crate::model::FlowStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub timestamp: DateTime<Utc>,
    pub from_state: FlowStatus,
    pub to_state: FlowStatus,
    pub event: FlowEvent,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Almacén de historial por flow. Objeto explícito con dueño claro (el state
/// machine), nada de estado global de módulo.
#[derive(Debug)]
pub struct TransitionHistory {
    inner: HashMap<Uuid, Vec<TransitionRecord>>,
    retention: usize,
}

impl Default for TransitionHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_RETENTION)
    }
}

impl TransitionHistory {
    pub fn new(retention: usize) -> Self {
        Self { inner: HashMap::new(),
               retention: retention.max(2) }
    }

    /// Agrega una entrada. Al exceder la retención se descartan las entradas
    /// más viejas conservando siempre la primera (origen del flow).
    pub fn append(&mut self, flow_id: Uuid, record: TransitionRecord) {
        let entries = self.inner.entry(flow_id).or_default();
        entries.push(record);
        while entries.len() > self.retention {
            entries.remove(1);
        }
    }

    pub fn list(&self, flow_id: Uuid) -> Vec<TransitionRecord> {
        self.inner.get(&flow_id).cloned().unwrap_or_default()
    }

    pub fn len(&self, flow_id: Uuid) -> usize {
        self.inner.get(&flow_id).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self, flow_id: Uuid) -> bool {
        self.len(flow_id) == 0
    }

    pub fn last(&self, flow_id: Uuid) -> Option<&TransitionRecord> {
        self.inner.get(&flow_id).and_then(|v| v.last())
    }

    /// Cola más reciente de hasta `n` entradas (para el snapshot persistido).
    pub fn tail(&self, flow_id: Uuid, n: usize) -> Vec<TransitionRecord> {
        match self.inner.get(&flow_id) {
            Some(entries) => {
                let start = entries.len().saturating_sub(n);
                entries[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Segundos transcurridos desde la entrada más reciente cuyo `to_state`
    /// es `state` (es decir, desde que el flow entró al estado actual).
    pub fn seconds_in_state(&self, flow_id: Uuid, state: FlowStatus, now: DateTime<Utc>) -> Option<f64> {
        self.inner
            .get(&flow_id)?
            .iter()
            .rev()
            .find(|r| r.to_state == state)
            .map(|r| (now - r.timestamp).num_milliseconds() as f64 / 1000.0)
    }

    /// Siembra el historial restaurado de un snapshot (reemplaza lo que haya).
    pub fn seed(&mut self, flow_id: Uuid, records: Vec<TransitionRecord>) {
        self.inner.insert(flow_id, records);
    }

    /// Barrido de limpieza: descarta entradas más viejas que `max_age`,
    /// conservando la primera de cada flow; elimina flows sin entradas.
    pub fn cleanup(&mut self, max_age: Duration) {
        let cutoff = Utc::now() - max_age;
        for entries in self.inner.values_mut() {
            if entries.len() <= 1 {
                continue;
            }
            let first = entries[0].clone();
            entries.retain(|r| r.timestamp >= cutoff);
            if entries.first().map(|r| r.timestamp) != Some(first.timestamp) {
                entries.insert(0, first);
            }
        }
        self.inner.retain(|_, v| !v.is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(to: FlowStatus) -> TransitionRecord {
        TransitionRecord { timestamp: Utc::now(),
                           from_state: FlowStatus::Initialized,
                           to_state: to,
                           event: FlowEvent::Start,
                           metadata: json!({}),
                           duration_seconds: None }
    }

    #[test]
    fn retention_keeps_first_entry() {
        let mut history = TransitionHistory::new(3);
        let flow_id = Uuid::new_v4();
        history.append(flow_id, record(FlowStatus::Running));
        history.append(flow_id, record(FlowStatus::Paused));
        history.append(flow_id, record(FlowStatus::Running));
        history.append(flow_id, record(FlowStatus::Completed));

        let entries = history.list(flow_id);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].to_state, FlowStatus::Running, "first entry survives the cap");
        assert_eq!(entries[2].to_state, FlowStatus::Completed);
    }

    #[test]
    fn seconds_in_state_finds_most_recent_match() {
        let mut history = TransitionHistory::default();
        let flow_id = Uuid::new_v4();
        let mut old = record(FlowStatus::Running);
        old.timestamp = Utc::now() - Duration::seconds(10);
        history.append(flow_id, old);

        let elapsed = history.seconds_in_state(flow_id, FlowStatus::Running, Utc::now()).unwrap();
        assert!(elapsed >= 9.9, "elapsed {elapsed} should reflect the 10s gap");
        assert!(history.seconds_in_state(flow_id, FlowStatus::Paused, Utc::now()).is_none());
    }

    #[test]
    fn tail_returns_most_recent_entries() {
        let mut history = TransitionHistory::default();
        let flow_id = Uuid::new_v4();
        for to in [FlowStatus::Running, FlowStatus::Paused, FlowStatus::Running] {
            history.append(flow_id, record(to));
        }
        let tail = history.tail(flow_id, 2);
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].to_state, FlowStatus::Paused);
    }
}
