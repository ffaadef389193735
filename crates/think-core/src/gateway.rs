//! Colaboradores externos del núcleo: plantillas y persistencia de sesión.
//!
//! El núcleo nunca invoca un modelo ni toca disco directamente; sólo habla
//! con estos dos contratos. `TemplateProvider` lo consume el executor (nunca
//! el state machine); `PersistenceGateway` recibe snapshots best-effort (una
//! falla de persistencia degrada durabilidad, jamás el comportamiento en
//! memoria).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::{Map, Value};

use crate::errors::FlowCoreError;

/// Resolución y renderizado de plantillas de contenido.
pub trait TemplateProvider {
    /// Renderiza la plantilla `name` con los parámetros escalares dados.
    fn get_template(&self, name: &str, params: &Map<String, Value>) -> Result<String, FlowCoreError>;

    /// Probe sin efectos, usado para decidir variantes por complejidad.
    fn has_template(&self, name: &str) -> bool;
}

/// Almacenamiento durable de blobs de sesión (JSON opaco para el backend).
pub trait PersistenceGateway {
    /// Devuelve el blob de la sesión, o `None` si no existe o no se pudo leer.
    fn load(&self, session_id: &str) -> Option<Value>;

    /// Guarda el blob; `false` indica falla (el caller loguea y continúa).
    fn save(&self, session_id: &str, blob: &Value) -> bool;
}

/// Gateway en memoria para tests y demos.
///
/// Handle clonable sobre un mapa compartido (`Rc<RefCell<...>>`): el state
/// machine y el servicio de recuperación pueden sostener clones que ven el
/// mismo backing store, respetando el modelo de un dueño lógico por flow.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    inner: Rc<RefCell<HashMap<String, Value>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }
}

impl PersistenceGateway for InMemorySessionStore {
    fn load(&self, session_id: &str) -> Option<Value> {
        self.inner.borrow().get(session_id).cloned()
    }

    fn save(&self, session_id: &str, blob: &Value) -> bool {
        self.inner.borrow_mut().insert(session_id.to_string(), blob.clone());
        true
    }
}

/// Gateway que rechaza toda escritura; útil para probar que la corrección en
/// memoria no depende del éxito de la persistencia.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingSessionStore;

impl PersistenceGateway for FailingSessionStore {
    fn load(&self, _session_id: &str) -> Option<Value> {
        None
    }

    fn save(&self, _session_id: &str, _blob: &Value) -> bool {
        false
    }
}
