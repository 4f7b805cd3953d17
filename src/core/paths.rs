//! Record names, environment variables and event names
//!
//! Centralized registry for every string the crate agrees on with the outside world.

/// Durable key store
pub mod store {
    /// Record holding the JSON array of provider keys connected last session.
    pub const RECORD: &str = "beeconnect_keys";
    /// Directory under `<root>/<app>` holding record files.
    pub const DATA_DIR: &str = "data";
    /// Extension appended to record names by the file backend.
    pub const EXTENSION: &str = "json";
}

/// Environment variables
pub mod env {
    pub const ROOT: &str = "BEECONNECT_ROOT";
    pub const LOG_JSON: &str = "BEECONNECT_LOG_JSON";
}

/// EIP-1193 methods and events used by the injected connector
pub mod eip1193 {
    pub const CHAIN_ID: &str = "eth_chainId";
    pub const ACCOUNTS: &str = "eth_accounts";
    pub const REQUEST_ACCOUNTS: &str = "eth_requestAccounts";

    pub const ACCOUNTS_CHANGED: &str = "accountsChanged";
    pub const CHAIN_CHANGED: &str = "chainChanged";
}

/// Provider key used by the default single-connector registry.
pub const DEFAULT_PROVIDER_KEY: &str = "MetaMask";
