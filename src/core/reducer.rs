//! Reducer: (state, action) -> state. Pure, no I/O, never mutates its input.

use super::state::{Action, GlobalState, PriorConnection, ProviderKey, ProviderState};

pub fn reduce(state: &GlobalState, action: &Action) -> GlobalState {
    match action {
        Action::Connecting { key } => {
            let mut next = without_connected(state, key);
            next.providers.insert(key.clone(), ProviderState::Connecting);
            next
        }
        Action::Connected { key, accounts, chain_id } => {
            let Some(account) = accounts.first() else {
                tracing::warn!(%key, "connected with an empty account list, treating as disconnected");
                return drop_provider(state, key);
            };
            let mut next = state.clone();
            next.providers.insert(key.clone(), ProviderState::connected(account.clone(), chain_id.clone()));
            if !next.connected_keys.contains(key) {
                next.connected_keys.push(key.clone());
            }
            next.selected_provider = Some(key.clone());
            next
        }
        Action::AccountsChanged { key, accounts } => {
            let Some(current) = state.providers.get(key) else {
                tracing::warn!(%key, "accountsChanged for an untracked provider, ignored");
                return state.clone();
            };
            let Some(account) = accounts.first() else { return drop_provider(state, key) };
            match current {
                ProviderState::Connecting => state.clone(),
                ProviderState::Connected { chain_id, .. } => {
                    let mut next = state.clone();
                    next.providers.insert(key.clone(), ProviderState::connected(account.clone(), chain_id.clone()));
                    next
                }
            }
        }
        Action::ChainChanged { key, chain_id } => {
            let Some(current) = state.providers.get(key) else {
                tracing::warn!(%key, "chainChanged for an untracked provider, ignored");
                return state.clone();
            };
            match current {
                ProviderState::Connecting => state.clone(),
                ProviderState::Connected { account, .. } => {
                    let mut next = state.clone();
                    next.providers.insert(key.clone(), ProviderState::connected(account.clone(), chain_id.clone()));
                    next
                }
            }
        }
        Action::Disconnected { key } => drop_provider(state, key),
        Action::SelectedProviderChanged { key } => {
            if !state.connected_keys.contains(key) {
                tracing::warn!(%key, "selected provider is not connected, ignored");
                return state.clone();
            }
            GlobalState { selected_provider: Some(key.clone()), ..state.clone() }
        }
        Action::ConnectFailed { key, previous } => match (state.providers.get(key), previous) {
            (Some(ProviderState::Connecting), Some(prior)) => restore(state, key, prior),
            (Some(ProviderState::Connecting), None) => drop_provider(state, key),
            _ => state.clone(),
        },
    }
}

/// Removes `key` from the connected set and the selection, keeping its entry.
fn without_connected(state: &GlobalState, key: &ProviderKey) -> GlobalState {
    GlobalState {
        providers: state.providers.clone(),
        connected_keys: state.connected_keys.iter().filter(|k| *k != key).cloned().collect(),
        selected_provider: state.selected_provider.clone().filter(|selected| selected != key),
    }
}

/// Puts a connection interrupted by a failed re-connect back where it was.
/// A selection made in the meantime wins over the restored one.
fn restore(state: &GlobalState, key: &ProviderKey, prior: &PriorConnection) -> GlobalState {
    let mut next = without_connected(state, key);
    next.providers.insert(key.clone(), ProviderState::connected(prior.account.clone(), prior.chain_id.clone()));
    let position = prior.position.min(next.connected_keys.len());
    next.connected_keys.insert(position, key.clone());
    if prior.selected && next.selected_provider.is_none() {
        next.selected_provider = Some(key.clone());
    }
    next
}

fn drop_provider(state: &GlobalState, key: &ProviderKey) -> GlobalState {
    let mut next = without_connected(state, key);
    next.providers.remove(key);
    next
}
