//! Beeconnect: wallet connection sessions. One reducer, many connectors.
//!
//! # Architecture
//!
//! ```text
//! Session (entry point)
//!   │
//!   ├── Connectors (fixed key -> connector registry)
//!   │     ├── "MetaMask" → InjectedConnector<P: Eip1193Provider>
//!   │     └── ...        → any `impl Connector`
//!   │
//!   ├── KeyStore (keys connected last time)
//!   │     └── DurableKeyStore<B> over MemoryBackend / FileBackend
//!   │
//!   ├── reduce(GlobalState, Action) → watch::Sender<SessionSnapshot>
//!   │
//!   └── SubscriptionManager (accounts/chain notifications per connected key)
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | synchronize | `session.synchronize()` | Recover persisted connections, then become ready |
//! | connect | `session.connect(key)` | Prompting connect, key persisted on success |
//! | disconnect | `session.disconnect(key)` | Disconnect and forget the key |
//! | select | `session.select(key)` | Change the active provider |
//! | provider | `session.provider(key)` | Per-provider view with bound actions |
//! | close | `session.close()` | Drop subscriptions, discard late events |
//!
//! # Features
//!
//! - `native` - File key store, tracing subscriber setup, `beeconnect` CLI
//!
//! # Usage
//!
//! ```ignore
//! use beeconnect::{Connectors, Session, SessionConfig};
//!
//! let session = Session::from_config(
//!     &SessionConfig::new("mydapp"),
//!     Connectors::injected_default(Some(provider)),
//! )?;
//! session.spawn_synchronize();
//!
//! session.connect("MetaMask").await?;
//! let active = session.selected_provider()?;
//! ```

// =============================================================================
// Shared modules
// =============================================================================
pub mod connector;
pub mod core;
pub mod runtime;
pub mod session;
pub mod store;
pub mod testing;

// =============================================================================
// Native-only modules (filesystem, subscriber setup)
// =============================================================================
#[cfg(feature = "native")]
pub mod logging;

// =============================================================================
// Re-exports
// =============================================================================
pub use connector::{
    Connection, Connector, ConnectorError, Connectors, Eip1193Provider, InjectedConnector, ProviderHandle,
    Subscription,
};
pub use core::{reduce, Action, GlobalState, PriorConnection, ProviderKey, ProviderState};
pub use runtime::Shutdown;
pub use session::{
    ConnectedProvider, GlobalStatus, ProviderStatus, ProviderView, Session, SessionConfig, SessionError,
    SessionSnapshot,
};
pub use store::{DurableKeyStore, KeyStore, MemoryBackend, StorageBackend, StoreError};

#[cfg(feature = "native")]
pub use logging::{init_logging, LogFormat};
#[cfg(feature = "native")]
pub use store::FileBackend;
