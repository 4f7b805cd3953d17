//! Session Configuration - passed from higher layers

use std::path::PathBuf;

use super::SessionError;
use crate::core::paths;
#[cfg(feature = "native")]
use crate::store::{DurableKeyStore, FileBackend};

/// Where a session keeps its durable key record. Higher layers construct this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub app: String,
    /// Root directory; `None` means `$BEECONNECT_ROOT`, then the platform data dir.
    pub root: Option<PathBuf>,
    pub record: String,
}

impl Default for SessionConfig {
    fn default() -> Self { Self { app: "beeconnect".into(), root: None, record: paths::store::RECORD.into() } }
}

impl SessionConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self { self.root = Some(root.into()); self }
    pub fn with_record(mut self, record: impl Into<String>) -> Self { self.record = record.into(); self }

    pub fn validate(&self) -> Result<(), SessionError> {
        for (field, value) in [("app", &self.app), ("record", &self.record)] {
            if value.trim().is_empty() {
                return Err(SessionError::Config(format!("{field} must not be empty")));
            }
            if value.contains(['/', '\\']) || value == ".." {
                return Err(SessionError::Config(format!("{field} must be a single path segment: {value}")));
            }
        }
        Ok(())
    }

    #[cfg(feature = "native")]
    pub fn backend(&self) -> FileBackend { FileBackend::for_app(&self.app, self.root.as_deref()) }

    #[cfg(feature = "native")]
    pub fn open_store(&self) -> DurableKeyStore<FileBackend> {
        DurableKeyStore::with_record(self.backend(), self.record.clone())
    }
}
