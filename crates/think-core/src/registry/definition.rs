//! Definiciones de flujo: catálogo estático nombre -> lista ordenada de
//! descriptores de step.
//!
//! Una definición es declarativa y serializable; materializarla produce un
//! `Flow` en estado `Initialized` con los invariantes ya validados
//! (dependencias existentes, grafo acíclico).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::FlowCoreError;
use crate::model::{Flow, FlowStep};

/// Descriptor declarativo de un step dentro de una definición.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub step_id: String,
    pub step_name: String,
    pub step_type: String,
    pub template_name: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Configuración opcional del step (override `template`, `for_each`,
    /// params extra). Objeto JSON; vacío por defecto.
    #[serde(default = "empty_object")]
    pub config: Value,
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl StepDescriptor {
    pub fn new(step_id: impl Into<String>,
               step_name: impl Into<String>,
               step_type: impl Into<String>,
               template_name: impl Into<String>)
               -> Self {
        Self { step_id: step_id.into(),
               step_name: step_name.into(),
               step_type: step_type.into(),
               template_name: template_name.into(),
               dependencies: Vec::new(),
               config: empty_object() }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

/// Definición inmutable de un tipo de flujo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub flow_name: String,
    pub steps: Vec<StepDescriptor>,
}

impl FlowDefinition {
    pub fn new(flow_name: impl Into<String>) -> Self {
        Self { flow_name: flow_name.into(),
               steps: Vec::new() }
    }

    pub fn with_step(mut self, descriptor: StepDescriptor) -> Self {
        self.steps.push(descriptor);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Construye un `Flow` nuevo (estado `Initialized`) para la sesión dada.
    pub fn materialize(&self, session_id: &str) -> Result<Flow, FlowCoreError> {
        let mut flow = Flow::new(&self.flow_name, session_id);
        for d in &self.steps {
            let step = FlowStep::new(&d.step_id, &d.step_name, &d.step_type, &d.template_name)
                .with_dependencies(d.dependencies.clone())
                .with_config(d.config.clone());
            flow.add_step(step)?;
        }
        flow.validate()?;
        Ok(flow)
    }
}

/// Catálogo nombre -> definición. Se puebla durante el arranque y luego se
/// consulta de forma read-only.
#[derive(Debug, Default)]
pub struct DefinitionRegistry {
    inner: IndexMap<String, FlowDefinition>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: FlowDefinition) {
        self.inner.insert(definition.flow_name.clone(), definition);
    }

    pub fn get(&self, flow_name: &str) -> Option<&FlowDefinition> {
        self.inner.get(flow_name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.inner.keys().map(|k| k.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Materializa la definición registrada bajo `flow_name`.
    pub fn materialize(&self, flow_name: &str, session_id: &str) -> Result<Flow, FlowCoreError> {
        let definition = self.get(flow_name)
                             .ok_or_else(|| FlowCoreError::DefinitionNotFound { flow_name: flow_name.to_string() })?;
        definition.materialize(session_id)
    }
}
