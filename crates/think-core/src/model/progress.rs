//! Vista derivada de avance de un Flow (sin efectos secundarios).

use serde::Serialize;
use uuid::Uuid;

use crate::model::flow::FlowStatus;

#[derive(Debug, Clone, Serialize)]
pub struct FlowProgress {
    pub flow_id: Uuid,
    pub flow_name: String,
    pub status: FlowStatus,
    pub total_steps: usize,
    pub completed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    pub percent_complete: f64,
    /// Id del step apuntado por el cursor (None si el pipeline terminó).
    pub current_step: Option<String>,
    pub elapsed_seconds: Option<f64>,
}
