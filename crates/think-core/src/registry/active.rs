//! Registro en memoria de flows activos, keyed por `flow_id`.
//!
//! Objeto explícito (no estado global) que se inyecta al executor. El diseño
//! asume un único dueño lógico por flow a la vez; no hay sincronización
//! interna para mutación concurrente del mismo flow_id.

use std::collections::HashMap;
use uuid::Uuid;

use crate::model::Flow;

#[derive(Debug, Default)]
pub struct ActiveFlowRegistry {
    inner: HashMap<Uuid, Flow>,
}

impl ActiveFlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un flow y devuelve su id.
    pub fn insert(&mut self, flow: Flow) -> Uuid {
        let id = flow.flow_id;
        self.inner.insert(id, flow);
        id
    }

    pub fn get(&self, flow_id: Uuid) -> Option<&Flow> {
        self.inner.get(&flow_id)
    }

    pub fn get_mut(&mut self, flow_id: Uuid) -> Option<&mut Flow> {
        self.inner.get_mut(&flow_id)
    }

    /// Quita un flow del registro (su snapshot persistido sobrevive afuera).
    pub fn remove(&mut self, flow_id: Uuid) -> Option<Flow> {
        self.inner.remove(&flow_id)
    }

    pub fn contains(&self, flow_id: Uuid) -> bool {
        self.inner.contains_key(&flow_id)
    }

    pub fn ids(&self) -> Vec<Uuid> {
        self.inner.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
