//! Gateway de sesión respaldado por filesystem: un archivo JSON por sesión.
//!
//! Las claves de sesión se sanitizan a un nombre de archivo plano (los
//! separadores de checkpoint `::` y cualquier otro caracter fuera de
//! `[A-Za-z0-9._-]` se reemplazan por `_`). Las escrituras son atómicas:
//! archivo temporal en el mismo directorio y `rename` al destino.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use think_core::PersistenceGateway;

use crate::config::StoreConfig;
use crate::error::PersistenceError;

#[derive(Debug, Clone)]
pub struct FileSessionGateway {
    data_dir: PathBuf,
}

impl FileSessionGateway {
    /// Crea el gateway y asegura el directorio de datos.
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, PersistenceError> {
        Self::new(config.data_dir.clone())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Sesiones presentes en disco (nombres de archivo sanitizados).
    pub fn list_sessions(&self) -> Result<Vec<String>, PersistenceError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(stem) = Path::new(&name).file_stem().and_then(|s| s.to_str()) {
                if name.to_string_lossy().ends_with(".json") {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete_session(&self, session_id: &str) -> Result<bool, PersistenceError> {
        let path = self.session_path(session_id)?;
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Lectura tipada: `Ok(None)` si la sesión no existe.
    pub fn load_session(&self, session_id: &str) -> Result<Option<Value>, PersistenceError> {
        let path = self.session_path(session_id)?;
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Escritura atómica: temp en el mismo directorio + rename.
    pub fn save_session(&self, session_id: &str, blob: &Value) -> Result<(), PersistenceError> {
        let path = self.session_path(session_id)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(blob)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn session_path(&self, session_id: &str) -> Result<PathBuf, PersistenceError> {
        let sanitized = sanitize_session_id(session_id)?;
        Ok(self.data_dir.join(format!("{sanitized}.json")))
    }
}

/// Aplana el id de sesión a un nombre de archivo seguro. Ids vacíos o
/// compuestos sólo de caracteres reemplazados se rechazan.
fn sanitize_session_id(session_id: &str) -> Result<String, PersistenceError> {
    if session_id.is_empty() {
        return Err(PersistenceError::InvalidSessionId("empty".into()));
    }
    let sanitized: String = session_id.chars()
                                      .map(|c| {
                                          if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                                              c
                                          } else {
                                              '_'
                                          }
                                      })
                                      .collect();
    if sanitized.chars().all(|c| c == '_' || c == '.') {
        return Err(PersistenceError::InvalidSessionId(session_id.to_string()));
    }
    Ok(sanitized)
}

// El contrato del core es best-effort: las fallas degradan a None/false con
// warning y la operación en memoria continúa.
impl PersistenceGateway for FileSessionGateway {
    fn load(&self, session_id: &str) -> Option<Value> {
        match self.load_session(session_id) {
            Ok(blob) => blob,
            Err(e) => {
                log::warn!("failed to load session {session_id}: {e}");
                None
            }
        }
    }

    fn save(&self, session_id: &str, blob: &Value) -> bool {
        match self.save_session(session_id, blob) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("failed to save session {session_id}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_flattens_checkpoint_keys() {
        assert_eq!(sanitize_session_id("sess-1").unwrap(), "sess-1");
        assert_eq!(sanitize_session_id("sess-1::checkpoint::warm").unwrap(),
                   "sess-1__checkpoint__warm");
        assert!(sanitize_session_id("").is_err());
        assert!(sanitize_session_id("///").is_err());
    }
}
