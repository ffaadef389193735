//! Constantes del núcleo de flujos.
//!
//! Este módulo agrupa valores estáticos que participan en la serialización de
//! snapshots y en los presupuestos por defecto del motor. `PERSISTENCE_VERSION`
//! forma parte del contrato del blob persistido: la restauración hace match
//! exhaustivo sobre esta versión y rechaza versiones desconocidas.

/// Versión del esquema de snapshot persistido. Incrementar sólo ante cambios
/// incompatibles del shape `{flow_state, current_step, step_number, ...}`.
pub const PERSISTENCE_VERSION: u64 = 1;

/// Presupuesto de reintentos por step si la definición no indica otro.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Retención del historial de transiciones por flow (se conserva siempre la
/// primera entrada más la cola más reciente).
pub const DEFAULT_HISTORY_RETENTION: usize = 1000;

/// Cantidad de entradas de historial que viajan dentro del snapshot.
pub const HISTORY_TAIL_PERSISTED: usize = 50;
