//! Estadísticas de ejecución por flow y por step (conteos, tiempo acumulado y
//! promedio). Objeto explícito propiedad del executor.

use std::collections::HashMap;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize)]
pub struct StepStats {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_time_ms: u64,
}

impl StepStats {
    fn record(&mut self, ok: bool, elapsed_ms: u64) {
        self.executions += 1;
        if ok {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.total_time_ms += elapsed_ms;
    }

    pub fn average_time_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.executions as f64
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowStats {
    pub executions: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_time_ms: u64,
    pub per_step: HashMap<String, StepStats>,
}

impl FlowStats {
    pub fn average_time_ms(&self) -> f64 {
        if self.executions == 0 {
            0.0
        } else {
            self.total_time_ms as f64 / self.executions as f64
        }
    }
}

#[derive(Debug, Default)]
pub struct ExecutionStats {
    per_flow: HashMap<Uuid, FlowStats>,
}

impl ExecutionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, flow_id: Uuid, step_id: &str, ok: bool, elapsed_ms: u64) {
        let flow = self.per_flow.entry(flow_id).or_default();
        flow.executions += 1;
        if ok {
            flow.successes += 1;
        } else {
            flow.failures += 1;
        }
        flow.total_time_ms += elapsed_ms;
        flow.per_step.entry(step_id.to_string()).or_default().record(ok, elapsed_ms);
    }

    pub fn flow(&self, flow_id: Uuid) -> Option<&FlowStats> {
        self.per_flow.get(&flow_id)
    }

    pub fn step(&self, flow_id: Uuid, step_id: &str) -> Option<&StepStats> {
        self.per_flow.get(&flow_id).and_then(|f| f.per_step.get(step_id))
    }
}
