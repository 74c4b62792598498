use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use thiserror::Error;

use super::PendingPaymentDescriptor;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("descriptor store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("descriptor at {path} is unreadable: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("descriptor store lock poisoned")]
    Poisoned,
}

/// Durable home of at most one pending payment descriptor.
pub trait DescriptorStore: Send + Sync {
    fn load(&self) -> Result<Option<PendingPaymentDescriptor>, StoreError>;
    fn save(&self, descriptor: &PendingPaymentDescriptor) -> Result<(), StoreError>;
    fn clear(&self) -> Result<(), StoreError>;
}

/// Keeps the descriptor as a JSON file. Writes go to a sibling temp file
/// that is renamed into place, so a reader never sees a half-written file.
#[derive(Debug, Clone)]
pub struct FileDescriptorStore {
    path: PathBuf,
}

impl FileDescriptorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl DescriptorStore for FileDescriptorStore {
    fn load(&self) -> Result<Option<PendingPaymentDescriptor>, StoreError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, descriptor: &PendingPaymentDescriptor) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let body = serde_json::to_vec_pretty(descriptor).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Process-local store. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDescriptorStore {
    slot: Arc<Mutex<Option<PendingPaymentDescriptor>>>,
}

impl DescriptorStore for InMemoryDescriptorStore {
    fn load(&self) -> Result<Option<PendingPaymentDescriptor>, StoreError> {
        self.slot
            .lock()
            .map(|slot| slot.clone())
            .map_err(|_| StoreError::Poisoned)
    }

    fn save(&self, descriptor: &PendingPaymentDescriptor) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = Some(descriptor.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.lock().map_err(|_| StoreError::Poisoned)?;
        *slot = None;
        Ok(())
    }
}
