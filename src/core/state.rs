//! Data model: provider keys, per-provider state, global state, actions

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

/// Stable identifier an application assigns to a registered connector.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderKey(String);

impl ProviderKey {
    pub fn new(key: impl Into<String>) -> Self { Self(key.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ProviderKey {
    fn from(key: &str) -> Self { Self(key.to_string()) }
}

impl From<String> for ProviderKey {
    fn from(key: String) -> Self { Self(key) }
}

impl Borrow<str> for ProviderKey {
    fn borrow(&self) -> &str { &self.0 }
}

impl AsRef<str> for ProviderKey {
    fn as_ref(&self) -> &str { &self.0 }
}

impl PartialEq<str> for ProviderKey {
    fn eq(&self, other: &str) -> bool { self.0 == other }
}

impl PartialEq<&str> for ProviderKey {
    fn eq(&self, other: &&str) -> bool { self.0 == *other }
}

/// Runtime state of one tracked connector. No entry means not connected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ProviderState {
    Connecting,
    #[serde(rename_all = "camelCase")]
    Connected { account: String, chain_id: String },
}

impl ProviderState {
    pub fn connected(account: impl Into<String>, chain_id: impl Into<String>) -> Self {
        Self::Connected { account: account.into(), chain_id: chain_id.into() }
    }

    pub fn is_connected(&self) -> bool { matches!(self, Self::Connected { .. }) }

    pub fn account(&self) -> Option<&str> {
        match self {
            Self::Connected { account, .. } => Some(account),
            Self::Connecting => None,
        }
    }

    pub fn chain_id(&self) -> Option<&str> {
        match self {
            Self::Connected { chain_id, .. } => Some(chain_id),
            Self::Connecting => None,
        }
    }
}

/// Aggregate connection state shared by every view of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalState {
    pub providers: BTreeMap<ProviderKey, ProviderState>,
    /// Fully connected keys in connection order. Never holds a connecting key.
    pub connected_keys: Vec<ProviderKey>,
    pub selected_provider: Option<ProviderKey>,
}

impl GlobalState {
    pub fn provider(&self, key: &str) -> Option<&ProviderState> { self.providers.get(key) }

    pub fn is_connected(&self, key: &str) -> bool {
        self.connected_keys.iter().any(|k| k.as_str() == key)
    }

    /// The live connection `key` would lose by re-entering `Connecting`.
    pub fn prior_connection(&self, key: &str) -> Option<PriorConnection> {
        let position = self.connected_keys.iter().position(|k| k.as_str() == key)?;
        let ProviderState::Connected { account, chain_id } = self.providers.get(key)? else { return None };
        Some(PriorConnection {
            account: account.clone(),
            chain_id: chain_id.clone(),
            position,
            selected: self.selected_provider.as_ref().is_some_and(|s| s.as_str() == key),
        })
    }

    /// Checks every structural invariant, returning the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if let Some(selected) = &self.selected_provider {
            if !self.is_connected(selected.as_str()) {
                return Err(format!("selected provider {selected} is not connected"));
            }
        }
        for (i, key) in self.connected_keys.iter().enumerate() {
            if self.connected_keys[..i].contains(key) {
                return Err(format!("{key} appears twice in connected keys"));
            }
            match self.providers.get(key) {
                Some(state) if state.is_connected() => {}
                Some(_) => return Err(format!("{key} is connected but its state is connecting")),
                None => return Err(format!("{key} is connected but has no provider state")),
            }
        }
        for (key, state) in &self.providers {
            if state.is_connected() && !self.is_connected(key.as_str()) {
                return Err(format!("{key} has connected state but is missing from connected keys"));
            }
        }
        Ok(())
    }
}

/// Snapshot of a connection taken before a re-connect prompt, restored if
/// the prompt fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorConnection {
    pub account: String,
    pub chain_id: String,
    /// Index in `connected_keys`.
    pub position: usize,
    pub selected: bool,
}

/// Every legal state-machine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Connecting { key: ProviderKey },
    Connected { key: ProviderKey, accounts: Vec<String>, chain_id: String },
    AccountsChanged { key: ProviderKey, accounts: Vec<String> },
    ChainChanged { key: ProviderKey, chain_id: String },
    Disconnected { key: ProviderKey },
    SelectedProviderChanged { key: ProviderKey },
    ConnectFailed { key: ProviderKey, previous: Option<PriorConnection> },
}

impl Action {
    pub fn key(&self) -> &ProviderKey {
        match self {
            Action::Connecting { key }
            | Action::Connected { key, .. }
            | Action::AccountsChanged { key, .. }
            | Action::ChainChanged { key, .. }
            | Action::Disconnected { key }
            | Action::SelectedProviderChanged { key }
            | Action::ConnectFailed { key, .. } => key,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Connecting { .. } => "connecting",
            Action::Connected { .. } => "connected",
            Action::AccountsChanged { .. } => "accountChanged",
            Action::ChainChanged { .. } => "chainChanged",
            Action::Disconnected { .. } => "disconnected",
            Action::SelectedProviderChanged { .. } => "selectedProviderChanged",
            Action::ConnectFailed { .. } => "connectFailed",
        }
    }

    /// True when applying this action drops its key to fully disconnected
    /// and the durable record must forget it.
    pub fn purges_key(&self) -> bool {
        match self {
            Action::AccountsChanged { accounts, .. } | Action::Connected { accounts, .. } => accounts.is_empty(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provider_state_serializes_with_status_tag() {
        let state = ProviderState::connected("0xabc", "0x1");
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"status": "connected", "account": "0xabc", "chainId": "0x1"})
        );
        assert_eq!(serde_json::to_value(ProviderState::Connecting).unwrap(), json!({"status": "connecting"}));
    }

    #[test]
    fn invariants_catch_dangling_selection() {
        let state = GlobalState { selected_provider: Some("A".into()), ..Default::default() };
        assert!(state.check_invariants().is_err());
        assert!(GlobalState::default().check_invariants().is_ok());
    }

    #[test]
    fn invariants_catch_connecting_key_in_connected_set() {
        let mut state = GlobalState::default();
        state.providers.insert("A".into(), ProviderState::Connecting);
        state.connected_keys.push("A".into());
        assert!(state.check_invariants().is_err());
    }

    #[test]
    fn prior_connection_records_place_and_selection() {
        let mut state = GlobalState::default();
        for key in ["A", "B"] {
            state.providers.insert(key.into(), ProviderState::connected("0x1", "0x5"));
            state.connected_keys.push(key.into());
        }
        state.selected_provider = Some("B".into());

        let prior = state.prior_connection("B").unwrap();
        assert_eq!(prior, PriorConnection { account: "0x1".into(), chain_id: "0x5".into(), position: 1, selected: true });
        assert!(!state.prior_connection("A").unwrap().selected);
        assert_eq!(state.prior_connection("Z"), None);
    }
}
