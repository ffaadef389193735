//! Modelos del agregado (Flow, FlowStep, progreso derivado).

pub mod flow;
pub mod progress;
pub mod step;

pub use flow::{Flow, FlowStatus};
pub use progress::FlowProgress;
pub use step::{FlowStep, StepStatus};
