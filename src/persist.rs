//! Persistence of the learned download buffer capacity
//!
//! After a buffer growth the new size is written back so the next start
//! allocates the right size up front instead of overflowing again.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::humanize::ByteSize;

#[derive(Debug, Error)]
pub enum CapacityStoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub trait CapacityStore: Send + Sync {
    /// Last persisted capacity, if any.
    fn load(&self) -> Option<usize>;
    fn save(&self, capacity: usize) -> Result<(), CapacityStoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    download: DownloadState,
}

#[derive(Debug, Serialize, Deserialize)]
struct DownloadState {
    buffer_capacity: ByteSize,
}

/// Capacity kept in a small TOML state file next to the device config.
#[derive(Debug, Clone)]
pub struct TomlCapacityStore {
    path: PathBuf,
}

impl TomlCapacityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CapacityStore for TomlCapacityStore {
    fn load(&self) -> Option<usize> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Could not read buffer state");
                return None;
            }
        };

        match toml::from_str::<StateFile>(&content) {
            Ok(state) => Some(state.download.buffer_capacity.as_usize()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring malformed buffer state");
                None
            }
        }
    }

    fn save(&self, capacity: usize) -> Result<(), CapacityStoreError> {
        let state = StateFile {
            download: DownloadState {
                buffer_capacity: ByteSize::from(capacity),
            },
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, toml::to_string(&state)?)?;
        debug!(path = %self.path.display(), capacity, "Buffer capacity persisted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        let store = TomlCapacityStore::new(dir.path().join("state.toml"));
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = TomlCapacityStore::new(dir.path().join("nested/state.toml"));

        store.save(128 * 1024).unwrap();
        assert_eq!(store.load(), Some(128 * 1024));

        let written = std::fs::read_to_string(store.path()).unwrap();
        assert!(written.contains("buffer_capacity = \"128KB\""));
    }

    #[test]
    fn test_malformed_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.toml");
        std::fs::write(&path, "download = 12").unwrap();
        assert_eq!(TomlCapacityStore::new(path).load(), None);
    }
}
