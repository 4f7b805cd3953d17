//! Connector: the capability every wallet integration satisfies
//!
//! The session never looks past this trait. Each concrete integration
//! (injected browser wallet, remote pairing, hardware bridge) implements it
//! on its own.
//!
//! # Operations
//!
//! | Method | Prompts user | Fails when |
//! |--------|--------------|------------|
//! | `handle` | no | never (returns `None` if unavailable) |
//! | `subscribe_accounts_changed` | no | provider unavailable |
//! | `subscribe_chain_changed` | no | provider unavailable |
//! | `synchronize` | no | genuine I/O failure only, `Ok(None)` if not authorized |
//! | `connect` | yes | user rejection or I/O failure |
//! | `disconnect` | no | I/O failure, idempotent otherwise |

mod injected;
mod registry;

pub use injected::{Eip1193Provider, InjectedConnector, ListenerId, ProviderListener};
pub use registry::Connectors;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Connector errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectorError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Provider I/O failed: {0}")]
    Io(String),

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Accounts and chain reported by a successful connect or synchronize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub accounts: Vec<String>,
    pub chain_id: String,
}

impl Connection {
    pub fn new(accounts: Vec<String>, chain_id: impl Into<String>) -> Self {
        Self { accounts, chain_id: chain_id.into() }
    }
}

pub type AccountsCallback = Box<dyn Fn(Vec<String>) + Send + Sync>;
pub type ChainCallback = Box<dyn Fn(String) + Send + Sync>;

/// Live notification registration. Unsubscribes when dropped.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self { Self { cancel: Some(Box::new(cancel)) } }

    pub fn unsubscribe(mut self) { self.cancel_now() }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() { cancel(); }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) { self.cancel_now() }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("active", &self.cancel.is_some()).finish()
    }
}

/// Type-erased handle on the provider object a connector wraps.
#[derive(Clone)]
pub struct ProviderHandle(Arc<dyn Any + Send + Sync>);

impl ProviderHandle {
    pub fn new<T: Any + Send + Sync>(provider: Arc<T>) -> Self { Self(provider) }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> { self.0.clone().downcast::<T>().ok() }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ProviderHandle(..)") }
}

#[async_trait]
pub trait Connector: Send + Sync {
    /// Globally unique, immutable connector id (distinct from its provider key).
    fn id(&self) -> &str;

    fn handle(&self) -> Option<ProviderHandle>;

    /// Implementations must not invoke `callback` before returning.
    fn subscribe_accounts_changed(&self, callback: AccountsCallback) -> Result<Subscription, ConnectorError>;

    /// Implementations must not invoke `callback` before returning.
    fn subscribe_chain_changed(&self, callback: ChainCallback) -> Result<Subscription, ConnectorError>;

    async fn synchronize(&self) -> Result<Option<Connection>, ConnectorError>;

    async fn connect(&self) -> Result<Connection, ConnectorError>;

    async fn disconnect(&self) -> Result<(), ConnectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn subscription_cancels_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let sub = Subscription::new(move || { c.fetch_add(1, Ordering::SeqCst); });
        sub.unsubscribe();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let c = count.clone();
        drop(Subscription::new(move || { c.fetch_add(1, Ordering::SeqCst); }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn handle_downcasts_to_provider_type() {
        let handle = ProviderHandle::new(Arc::new(String::from("provider")));
        assert_eq!(handle.downcast::<String>().as_deref().map(String::as_str), Some("provider"));
        assert!(handle.downcast::<u32>().is_none());
    }
}
