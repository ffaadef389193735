//! think-core: coordinación determinista de flujos de razonamiento
//!
//! Núcleo sin I/O propio: agregado Flow + state machine + executor de
//! plantillas + recuperación por snapshots. La persistencia y las plantillas
//! entran por traits (`PersistenceGateway`, `TemplateProvider`).

pub mod constants;
pub mod errors;
pub mod executor;
pub mod gateway;
pub mod machine;
pub mod model;
pub mod recovery;
pub mod registry;

pub use errors::FlowCoreError;
pub use executor::{ExecutionStats, ExecutionStatus, FlowExecutor, FlowRunSummary, StepExecution};
pub use gateway::{InMemorySessionStore, PersistenceGateway, TemplateProvider};
pub use machine::{FlowEvent, FlowStateMachine, TransitionHistory, TransitionRecord};
pub use model::{Flow, FlowProgress, FlowStatus, FlowStep, StepStatus};
pub use recovery::{RecoveryService, RestoredFlow};
pub use registry::{ActiveFlowRegistry, DefinitionRegistry, FlowDefinition, StepDescriptor};
