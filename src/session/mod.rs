//! Session - the connection-lifecycle orchestrator
//!
//! # Architecture
//!
//! ```text
//! UI action ──► Session::{connect, disconnect, select, synchronize}
//!                   │
//!                   ├──► Connector (async)        ──┐
//!                   ├──► KeyStore (durable keys)    │
//!                   ▼                               │
//!               dispatch(Action) ◄──────────────────┘
//!                   │
//!                   ▼
//!               reduce(state, action) ──► watch::Sender<SessionSnapshot> ──► views / UI
//!                   │
//!                   ▼ connected keys changed
//!               SubscriptionManager ──► Connector notifications ──► dispatch
//! ```
//!
//! # Operations
//!
//! | Operation | Fails with | Effect |
//! |-----------|------------|--------|
//! | `connect(key)` | `NotRegistered`, `ConnectionFailed` | connecting → connected, key persisted; a failed re-connect restores the prior connection |
//! | `disconnect(key)` | `NotRegistered`, `NotConnected`, `DisconnectionFailed` | key dropped and forgotten |
//! | `select(key)` | `NotRegistered` | selection moves if key is connected |
//! | `synchronize()` | never | recovers persisted keys, then marks the session ready |
//!
//! Dispatch is atomic: the reducer runs inside `watch::Sender::send_if_modified`,
//! so two transitions never interleave regardless of the runtime flavour.

mod config;
mod subscriptions;
mod view;

pub use config::SessionConfig;
pub use subscriptions::{Dispatcher, SubscriptionManager};
pub use view::{ConnectedProvider, ProviderStatus, ProviderView};

use futures::future::join_all;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::watch;

use crate::connector::{Connector, Connectors};
use crate::core::{reduce, Action, GlobalState, ProviderKey};
use crate::runtime::Shutdown;
use crate::store::KeyStore;

/// Session errors. Only configuration problems and explicit connect or
/// disconnect failures ever reach a caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Connector not registered: {0}")]
    NotRegistered(String),

    #[error("Invalid connector configuration: connector id {0} registered twice")]
    DuplicateConnector(String),

    #[error("Invalid connector configuration: provider key {0} registered twice")]
    DuplicateKey(String),

    #[error("Invalid session configuration: {0}")]
    Config(String),

    #[error("Error while connecting {0}")]
    ConnectionFailed(String),

    #[error("Error while disconnecting {0}")]
    DisconnectionFailed(String),

    #[error("Provider not connected: {0}")]
    NotConnected(String),

    #[error("No provider selected")]
    NoProviderSelected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum GlobalStatus {
    Initializing,
    NotConnected,
    Connected,
}

/// Published session state: the reducer's state plus the startup ready flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    #[serde(flatten)]
    pub state: GlobalState,
    pub ready: bool,
}

impl SessionSnapshot {
    pub fn status(&self) -> GlobalStatus {
        match (self.ready, &self.state.selected_provider) {
            (false, _) => GlobalStatus::Initializing,
            (true, None) => GlobalStatus::NotConnected,
            (true, Some(_)) => GlobalStatus::Connected,
        }
    }
}

/// Handle on one connection session. Cheap to clone; every clone drives
/// the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    me: Weak<SessionInner>,
    connectors: Connectors,
    store: Arc<dyn KeyStore>,
    snapshot: watch::Sender<SessionSnapshot>,
    subscriptions: SubscriptionManager,
    shutdown: Shutdown,
    started: AtomicBool,
}

impl Session {
    pub fn new(connectors: Connectors, store: Arc<dyn KeyStore>) -> Result<Self, SessionError> {
        let connectors = connectors.define()?;
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let inner = Arc::new_cyclic(|me| SessionInner {
            me: me.clone(),
            connectors,
            store,
            snapshot,
            subscriptions: SubscriptionManager::new(),
            shutdown: Shutdown::new(),
            started: AtomicBool::new(false),
        });
        Ok(Self { inner })
    }

    /// Session over the file-backed key store described by `config`.
    #[cfg(feature = "native")]
    pub fn from_config(config: &SessionConfig, connectors: Connectors) -> Result<Self, SessionError> {
        config.validate()?;
        Self::new(connectors, Arc::new(config.open_store()))
    }

    pub fn connectors(&self) -> &Connectors { &self.inner.connectors }
    pub fn key_store(&self) -> &Arc<dyn KeyStore> { &self.inner.store }
    pub fn shutdown(&self) -> &Shutdown { &self.inner.shutdown }

    pub fn snapshot(&self) -> SessionSnapshot { self.inner.snapshot.borrow().clone() }
    pub fn state(&self) -> GlobalState { self.inner.snapshot.borrow().state.clone() }
    pub fn global_status(&self) -> GlobalStatus { self.inner.snapshot.borrow().status() }
    pub fn is_ready(&self) -> bool { self.inner.snapshot.borrow().ready }
    pub fn is_closed(&self) -> bool { self.inner.shutdown.is_triggered() }

    /// Receiver that changes on every effective state transition.
    pub fn watch(&self) -> watch::Receiver<SessionSnapshot> { self.inner.snapshot.subscribe() }

    /// Keys holding live change subscriptions right now.
    pub fn subscribed_keys(&self) -> Vec<ProviderKey> { self.inner.subscriptions.subscribed_keys() }

    fn registered(&self, key: &str) -> Result<(ProviderKey, Arc<dyn Connector>), SessionError> {
        self.inner
            .connectors
            .entry(key)
            .map(|(k, c)| (k.clone(), c.clone()))
            .ok_or_else(|| SessionError::NotRegistered(key.to_string()))
    }

    pub async fn connect(&self, key: &str) -> Result<(), SessionError> {
        let (key, connector) = self.registered(key)?;
        let previous = self.inner.snapshot.borrow().state.prior_connection(key.as_str());
        self.inner.dispatch(Action::Connecting { key: key.clone() });

        let connection = match connector.connect().await {
            Ok(connection) if !connection.accounts.is_empty() => connection,
            Ok(_) => {
                tracing::error!(%key, "connector returned no accounts");
                self.inner.dispatch(Action::ConnectFailed { key: key.clone(), previous });
                return Err(SessionError::ConnectionFailed(key.to_string()));
            }
            Err(err) => {
                tracing::error!(%key, %err, restoring = previous.is_some(), "connection failed");
                self.inner.dispatch(Action::ConnectFailed { key: key.clone(), previous });
                return Err(SessionError::ConnectionFailed(key.to_string()));
            }
        };

        self.inner.store.add_key(&key);
        tracing::info!(%key, account = %connection.accounts[0], chain_id = %connection.chain_id, "provider connected");
        self.inner.dispatch(Action::Connected { key, accounts: connection.accounts, chain_id: connection.chain_id });
        Ok(())
    }

    pub async fn disconnect(&self, key: &str) -> Result<(), SessionError> {
        let (key, connector) = self.registered(key)?;
        let connected = self.inner.snapshot.borrow().state.is_connected(key.as_str());
        if !connected {
            return Err(SessionError::NotConnected(key.to_string()));
        }

        if let Err(err) = connector.disconnect().await {
            tracing::error!(%key, %err, "disconnect failed");
            return Err(SessionError::DisconnectionFailed(key.to_string()));
        }

        self.inner.store.remove_key(&key);
        tracing::info!(%key, "provider disconnected");
        self.inner.dispatch(Action::Disconnected { key });
        Ok(())
    }

    /// Makes `key` the active provider. Selecting a key that is not
    /// connected leaves the state untouched.
    pub fn select(&self, key: &str) -> Result<(), SessionError> {
        let (key, _) = self.registered(key)?;
        self.inner.dispatch(Action::SelectedProviderChanged { key });
        Ok(())
    }

    /// Startup recovery. Persisted keys are synchronized concurrently; each
    /// outcome is applied as soon as it settles and the session becomes ready
    /// once all have. Never fails. Later calls are no-ops.
    pub async fn synchronize(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            tracing::debug!("startup synchronize already ran");
            return;
        }

        let mut pending = Vec::new();
        for key in self.inner.store.keys() {
            match self.inner.connectors.entry(key.as_str()) {
                Some((key, connector)) => pending.push((key.clone(), connector.clone())),
                None => {
                    tracing::warn!(%key, "persisted provider no longer registered, purging");
                    self.inner.store.remove_key(&key);
                }
            }
        }

        let total = pending.len();
        join_all(pending.into_iter().map(|(key, connector)| self.synchronize_one(key, connector))).await;

        self.inner.snapshot.send_modify(|snapshot| snapshot.ready = true);
        let connected = self.inner.snapshot.borrow().state.connected_keys.len();
        tracing::info!(persisted = total, connected, "session ready");
    }

    async fn synchronize_one(&self, key: ProviderKey, connector: Arc<dyn Connector>) {
        match connector.synchronize().await {
            Ok(Some(connection)) if !connection.accounts.is_empty() => {
                tracing::info!(%key, chain_id = %connection.chain_id, "provider synchronized");
                self.inner.dispatch(Action::Connected { key, accounts: connection.accounts, chain_id: connection.chain_id });
            }
            Ok(_) => {
                tracing::debug!(%key, "provider no longer authorized, purging");
                self.inner.store.remove_key(&key);
            }
            Err(err) => {
                self.inner.store.remove_key(&key);
                tracing::warn!(%key, %err, "unable to synchronize provider");
            }
        }
    }

    /// Runs `synchronize()` in the background so startup never blocks the caller.
    pub fn spawn_synchronize(&self) -> tokio::task::JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move { session.synchronize().await })
    }

    /// Ends the session: drops every subscription and discards any event
    /// that arrives afterwards.
    pub fn close(&self) {
        if self.inner.shutdown.trigger() {
            self.inner.subscriptions.close();
            tracing::info!("session closed");
        }
    }

    #[cfg(test)]
    pub(crate) fn dispatch(&self, action: Action) { self.inner.dispatch(action) }
}

impl SessionInner {
    fn dispatch(&self, action: Action) {
        if self.shutdown.is_triggered() {
            tracing::debug!(action = action.name(), key = %action.key(), "session closed, event discarded");
            return;
        }

        let mut keys_changed = false;
        self.snapshot.send_if_modified(|snapshot| {
            let next = reduce(&snapshot.state, &action);
            if next == snapshot.state {
                return false;
            }
            keys_changed = next.connected_keys != snapshot.state.connected_keys;
            snapshot.state = next;
            true
        });

        if action.purges_key() {
            self.store.remove_key(action.key());
        }
        if keys_changed {
            self.resubscribe();
        }
    }

    fn resubscribe(&self) {
        let me = self.me.clone();
        let dispatcher: Dispatcher = Arc::new(move |action: Action| {
            match me.upgrade() {
                Some(inner) => inner.dispatch(action),
                None => tracing::debug!(action = action.name(), "session dropped, event discarded"),
            }
        });
        let current = || self.snapshot.borrow().state.connected_keys.clone();
        self.subscriptions.sync(&self.connectors, current, &dispatcher);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connectors", &self.inner.connectors)
            .field("snapshot", &*self.inner.snapshot.borrow())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DurableKeyStore, MemoryBackend};
    use crate::testing::MockConnector;

    fn session(connectors: Connectors) -> Session {
        Session::new(connectors, Arc::new(DurableKeyStore::new(MemoryBackend::new()))).unwrap()
    }

    #[test]
    fn status_follows_ready_and_selection() {
        let mut snapshot = SessionSnapshot::default();
        assert_eq!(snapshot.status(), GlobalStatus::Initializing);
        snapshot.ready = true;
        assert_eq!(snapshot.status(), GlobalStatus::NotConnected);
        snapshot.state.selected_provider = Some("A".into());
        assert_eq!(snapshot.status(), GlobalStatus::Connected);
    }

    #[test]
    fn new_rejects_duplicate_connector_ids() {
        let connectors = Connectors::new()
            .with("A", Arc::new(MockConnector::new("dup")))
            .with("B", Arc::new(MockConnector::new("dup")));
        let err = Session::new(connectors, Arc::new(DurableKeyStore::new(MemoryBackend::new()))).unwrap_err();
        assert_eq!(err, SessionError::DuplicateConnector("dup".into()));
    }

    #[test]
    fn dispatch_without_change_does_not_notify() {
        let session = session(Connectors::new().with("A", Arc::new(MockConnector::new("a"))));
        let mut rx = session.watch();
        rx.borrow_and_update();
        session.dispatch(Action::Disconnected { key: "A".into() });
        assert!(!rx.has_changed().unwrap());
        session.dispatch(Action::Connecting { key: "A".into() });
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn empty_accounts_notification_purges_store() {
        let a = Arc::new(MockConnector::new("a"));
        let session = session(Connectors::new().with("A", a.clone()));
        session.key_store().add_key(&"A".into());
        session.dispatch(Action::Connected { key: "A".into(), accounts: vec!["0x1".into()], chain_id: "0x1".into() });
        assert_eq!(a.live_subscriptions(), 2);

        a.emit_accounts(vec![]);
        assert!(session.state().providers.is_empty());
        assert!(session.key_store().keys().is_empty());
        assert_eq!(a.live_subscriptions(), 0);
    }
}
