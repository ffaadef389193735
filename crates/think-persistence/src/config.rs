//! Carga de configuración del almacén desde variables de entorno.
//! Convención `THINKFLOW_DATA_DIR` más parámetros opcionales.

use std::env;
use std::path::PathBuf;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Directorio donde se guardan los blobs de sesión (un JSON por sesión).
    pub data_dir: PathBuf,
    /// Retención del historial de transiciones en memoria.
    pub history_retention: usize,
}

impl StoreConfig {
    pub fn from_env() -> Self {
        // asegura que .env se haya cargado
        Lazy::force(&DOTENV_LOADED);
        let data_dir = env::var("THINKFLOW_DATA_DIR").unwrap_or_else(|_| "data/sessions".into());
        let history_retention = env::var("THINKFLOW_HISTORY_RETENTION").ok()
                                                                       .and_then(|v| v.parse().ok())
                                                                       .unwrap_or(think_core::constants::DEFAULT_HISTORY_RETENTION);
        Self { data_dir: PathBuf::from(data_dir),
               history_retention }
    }
}

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}
