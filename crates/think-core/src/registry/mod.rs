//! Registros explícitos: catálogo de definiciones (read-only tras la carga) y
//! registro en memoria de flows activos.

pub mod active;
pub mod definition;

pub use active::ActiveFlowRegistry;
pub use definition::{DefinitionRegistry, FlowDefinition, StepDescriptor};
