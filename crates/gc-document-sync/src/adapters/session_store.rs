//! File-backed session store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use shared_types::Address;

use crate::domain::RegistryError;
use crate::ports::SessionStore;

#[derive(Debug, Serialize, Deserialize)]
struct SavedSession {
    account: Address,
}

/// Remembers the last connected account in a JSON file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Store backed by `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn store_error(err: impl std::fmt::Display) -> RegistryError {
    RegistryError::SessionStore(err.to_string())
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<Address>, RegistryError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(store_error(err)),
        };
        let saved: SavedSession = serde_json::from_str(&raw).map_err(store_error)?;
        Ok(Some(saved.account))
    }

    fn save(&self, account: &Address) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(store_error)?;
        }
        let raw = serde_json::to_string_pretty(&SavedSession { account: *account })
            .map_err(store_error)?;
        fs::write(&self.path, raw).map_err(store_error)
    }

    fn clear(&self) -> Result<(), RegistryError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(store_error(err)),
        }
    }
}
