//! Driver de ejecución: selección del siguiente step, resolución de
//! plantillas, expansión for-each y estadísticas.

pub mod core;
pub mod foreach;
pub mod result;
pub mod stats;
pub mod template;

pub use self::core::FlowExecutor;
pub use result::{ExecutionStatus, FlowRunSummary, IterationOutcome, StepExecution, StepFailure};
pub use stats::{ExecutionStats, FlowStats, StepStats};
