//! think-persistence
//!
//! Implementación de `PersistenceGateway` sobre filesystem (un JSON por
//! sesión) más utilidades de configuración.
//!
//! Módulos:
//! - `file`: gateway de archivos con escritura atómica.
//! - `config`: carga de configuración desde .env.
//! - `error`: errores semánticos de la capa.

pub mod config;
pub mod error;
pub mod file;

pub use config::{init_dotenv, StoreConfig};
pub use error::PersistenceError;
pub use file::FileSessionGateway;
