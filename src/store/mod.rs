//! Durable key store: which provider keys were connected last session
//!
//! ```text
//! Session ──► KeyStore (keys / add_key / remove_key)
//!                 │
//!                 ▼
//!          DurableKeyStore<B>   one JSON array of strings under one record name
//!                 │
//!                 ▼
//!          StorageBackend       string-keyed medium (memory, files, ...)
//! ```
//!
//! The record is scratch state: a value that does not parse as an array of
//! strings is removed and read as empty, and backend write failures are
//! logged, never returned. Calling `synchronize()` again re-derives it.

#[cfg(feature = "native")]
mod file;

#[cfg(feature = "native")]
pub use file::FileBackend;

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::core::paths;
use crate::core::ProviderKey;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store io: {0}")]
    Io(#[from] std::io::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// String-keyed storage medium, shaped like browser local storage.
pub trait StorageBackend: Send + Sync {
    fn get_item(&self, name: &str) -> Result<Option<String>, StoreError>;
    fn set_item(&self, name: &str, value: &str) -> Result<(), StoreError>;
    fn remove_item(&self, name: &str) -> Result<(), StoreError>;
}

/// Durable record of connected provider keys.
pub trait KeyStore: Send + Sync {
    fn keys(&self) -> Vec<ProviderKey>;
    fn add_key(&self, key: &ProviderKey);
    fn remove_key(&self, key: &ProviderKey);
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self { Self::default() }
}

impl StorageBackend for MemoryBackend {
    fn get_item(&self, name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.items.lock().map_err(|_| StoreError::Poisoned)?.get(name).cloned())
    }

    fn set_item(&self, name: &str, value: &str) -> Result<(), StoreError> {
        self.items.lock().map_err(|_| StoreError::Poisoned)?.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, name: &str) -> Result<(), StoreError> {
        self.items.lock().map_err(|_| StoreError::Poisoned)?.remove(name);
        Ok(())
    }
}

impl<B: StorageBackend + ?Sized> StorageBackend for std::sync::Arc<B> {
    fn get_item(&self, name: &str) -> Result<Option<String>, StoreError> { (**self).get_item(name) }
    fn set_item(&self, name: &str, value: &str) -> Result<(), StoreError> { (**self).set_item(name, value) }
    fn remove_item(&self, name: &str) -> Result<(), StoreError> { (**self).remove_item(name) }
}

pub struct DurableKeyStore<B> {
    backend: B,
    record: String,
    // Serializes read-modify-write cycles from concurrent synchronize tasks.
    guard: Mutex<()>,
}

impl<B: StorageBackend> DurableKeyStore<B> {
    pub fn new(backend: B) -> Self { Self::with_record(backend, paths::store::RECORD) }

    pub fn with_record(backend: B, record: impl Into<String>) -> Self {
        Self { backend, record: record.into(), guard: Mutex::new(()) }
    }

    pub fn backend(&self) -> &B { &self.backend }

    pub fn record(&self) -> &str { &self.record }

    /// Drops the whole record.
    pub fn clear(&self) {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(err) = self.backend.remove_item(&self.record) {
            tracing::warn!(record = %self.record, %err, "failed to clear key record");
        }
    }

    fn read(&self) -> Vec<ProviderKey> {
        let raw = match self.backend.get_item(&self.record) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(record = %self.record, %err, "failed to read key record");
                return Vec::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(keys) => dedup(keys.into_iter().map(ProviderKey::from)),
            Err(err) => {
                tracing::warn!(record = %self.record, %err, "corrupt key record, resetting");
                if let Err(err) = self.backend.remove_item(&self.record) {
                    tracing::warn!(record = %self.record, %err, "failed to drop corrupt key record");
                }
                Vec::new()
            }
        }
    }

    fn write(&self, keys: &[ProviderKey]) {
        let value = match serde_json::to_string(keys) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(record = %self.record, %err, "failed to encode key record");
                return;
            }
        };
        if let Err(err) = self.backend.set_item(&self.record, &value) {
            tracing::warn!(record = %self.record, %err, "failed to write key record");
        }
    }
}

fn dedup(keys: impl Iterator<Item = ProviderKey>) -> Vec<ProviderKey> {
    let mut out: Vec<ProviderKey> = Vec::new();
    for key in keys {
        if !out.contains(&key) { out.push(key); }
    }
    out
}

impl<B: StorageBackend> KeyStore for DurableKeyStore<B> {
    fn keys(&self) -> Vec<ProviderKey> {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        self.read()
    }

    fn add_key(&self, key: &ProviderKey) {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys = self.read();
        if !keys.contains(key) {
            keys.push(key.clone());
        }
        self.write(&keys);
    }

    fn remove_key(&self, key: &ProviderKey) {
        let _guard = self.guard.lock().unwrap_or_else(|p| p.into_inner());
        let mut keys = self.read();
        keys.retain(|k| k != key);
        self.write(&keys);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store() -> (Arc<MemoryBackend>, DurableKeyStore<Arc<MemoryBackend>>) {
        let backend = Arc::new(MemoryBackend::new());
        (backend.clone(), DurableKeyStore::new(backend))
    }

    #[test]
    fn empty_store_has_no_keys() {
        let (_, store) = store();
        assert!(store.keys().is_empty());
    }

    #[test]
    fn add_and_remove_keep_order_and_uniqueness() {
        let (backend, store) = store();
        store.add_key(&"MetaMask".into());
        store.add_key(&"WalletConnect".into());
        store.add_key(&"MetaMask".into());
        assert_eq!(store.keys(), vec![ProviderKey::from("MetaMask"), ProviderKey::from("WalletConnect")]);
        assert_eq!(
            backend.get_item(paths::store::RECORD).unwrap().as_deref(),
            Some(r#"["MetaMask","WalletConnect"]"#)
        );

        store.remove_key(&"MetaMask".into());
        store.remove_key(&"Unknown".into());
        assert_eq!(store.keys(), vec![ProviderKey::from("WalletConnect")]);
    }

    #[test]
    fn corrupt_records_self_heal() {
        for corrupt in ["bla", r#"{"bla": 4}"#, "[4]"] {
            let (backend, store) = store();
            backend.set_item(paths::store::RECORD, corrupt).unwrap();
            assert!(store.keys().is_empty(), "{corrupt} should read as empty");
            assert_eq!(backend.get_item(paths::store::RECORD).unwrap(), None, "{corrupt} should be removed");
        }
    }

    #[test]
    fn add_after_corruption_starts_fresh() {
        let (backend, store) = store();
        backend.set_item(paths::store::RECORD, "not json").unwrap();
        store.add_key(&"A".into());
        assert_eq!(store.keys(), vec![ProviderKey::from("A")]);
    }

    #[test]
    fn custom_record_names_are_isolated() {
        let backend = Arc::new(MemoryBackend::new());
        let first = DurableKeyStore::with_record(backend.clone(), "first");
        let second = DurableKeyStore::with_record(backend, "second");
        first.add_key(&"A".into());
        assert!(second.keys().is_empty());
        first.clear();
        assert!(first.keys().is_empty());
    }
}
