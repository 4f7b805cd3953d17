//! Connectors: the fixed key -> connector registry a session is built from

use std::collections::HashSet;
use std::sync::Arc;

use super::{Connector, Eip1193Provider, InjectedConnector};
use crate::core::paths::DEFAULT_PROVIDER_KEY;
use crate::core::ProviderKey;
use crate::session::SessionError;

/// Ordered registry of connectors. Immutable once handed to a session.
#[derive(Clone, Default)]
pub struct Connectors {
    entries: Vec<(ProviderKey, Arc<dyn Connector>)>,
}

impl Connectors {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: impl Into<ProviderKey>, connector: Arc<dyn Connector>) -> Self {
        self.entries.push((key.into(), connector));
        self
    }

    /// Validates the registration: keys and connector ids must be unique.
    pub fn define(self) -> Result<Self, SessionError> {
        self.check_unique()?;
        Ok(self)
    }

    fn check_unique(&self) -> Result<(), SessionError> {
        let mut keys = HashSet::new();
        let mut ids = HashSet::new();
        for (key, connector) in &self.entries {
            if !keys.insert(key.as_str()) {
                return Err(SessionError::DuplicateKey(key.to_string()));
            }
            if !ids.insert(connector.id()) {
                return Err(SessionError::DuplicateConnector(connector.id().to_string()));
            }
        }
        Ok(())
    }

    /// Registry holding a single MetaMask-style injected connector.
    pub fn injected_default<P: Eip1193Provider>(provider: Option<Arc<P>>) -> Self {
        Self::new().with(DEFAULT_PROVIDER_KEY, Arc::new(InjectedConnector::metamask(provider)))
    }

    pub fn entry(&self, key: &str) -> Option<(&ProviderKey, &Arc<dyn Connector>)> {
        self.entries.iter().find(|(k, _)| k.as_str() == key).map(|(k, c)| (k, c))
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Connector>> { self.entry(key).map(|(_, c)| c) }

    pub fn contains(&self, key: &str) -> bool { self.get(key).is_some() }

    pub fn keys(&self) -> impl Iterator<Item = &ProviderKey> { self.entries.iter().map(|(k, _)| k) }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

impl std::fmt::Debug for Connectors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.entries.iter().map(|(k, c)| (k.as_str(), c.id()))).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;

    #[test]
    fn define_accepts_distinct_connectors() {
        let connectors = Connectors::new()
            .with("A", Arc::new(MockConnector::new("a")))
            .with("B", Arc::new(MockConnector::new("b")))
            .define()
            .unwrap();
        assert_eq!(connectors.len(), 2);
        assert!(connectors.contains("A"));
        assert!(!connectors.contains("C"));
        assert_eq!(connectors.keys().map(|k| k.as_str()).collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn define_rejects_duplicate_connector_ids() {
        let err = Connectors::new()
            .with("A", Arc::new(MockConnector::new("same")))
            .with("B", Arc::new(MockConnector::new("same")))
            .define()
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateConnector(id) if id == "same"));
    }

    #[test]
    fn define_rejects_duplicate_keys() {
        let err = Connectors::new()
            .with("A", Arc::new(MockConnector::new("a")))
            .with("A", Arc::new(MockConnector::new("b")))
            .define()
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateKey(key) if key == "A"));
    }
}
