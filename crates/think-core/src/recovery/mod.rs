//! Recuperación: snapshots versionados, restauración defensiva, rollback y
//! checkpoints nombrados.

pub mod service;
pub mod snapshot;

pub use service::{RecoveryService, RestoredFlow};
pub use snapshot::{build_snapshot, decode_flow, encode_flow};
