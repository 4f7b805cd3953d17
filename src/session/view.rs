//! Per-provider views derived from the session snapshot

use serde::Serialize;

use super::{Session, SessionError};
use crate::connector::ProviderHandle;
use crate::core::{ProviderKey, ProviderState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ProviderStatus {
    Initializing,
    Unavailable,
    NotConnected,
    Connecting,
    Connected,
}

/// What a UI needs to render one provider. Serializes without the bound session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderView {
    pub key: ProviderKey,
    pub status: ProviderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<String>,
    #[serde(skip)]
    pub handle: Option<ProviderHandle>,
    #[serde(skip)]
    session: Session,
}

impl ProviderView {
    pub async fn connect(&self) -> Result<(), SessionError> { self.session.connect(self.key.as_str()).await }

    pub async fn disconnect(&self) -> Result<(), SessionError> { self.session.disconnect(self.key.as_str()).await }

    pub fn is_connected(&self) -> bool { self.status == ProviderStatus::Connected }
}

/// A provider known to be connected at the time the view was taken.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedProvider {
    pub key: ProviderKey,
    pub account: String,
    pub chain_id: String,
    #[serde(skip)]
    pub handle: Option<ProviderHandle>,
    #[serde(skip)]
    session: Session,
}

impl ConnectedProvider {
    pub async fn disconnect(&self) -> Result<(), SessionError> { self.session.disconnect(self.key.as_str()).await }
}

impl Session {
    pub fn provider(&self, key: &str) -> Result<ProviderView, SessionError> {
        let (key, connector) = self.registered(key)?;
        let handle = connector.handle();
        let snapshot = self.snapshot();

        let (status, account, chain_id) = match (snapshot.ready, snapshot.state.providers.get(key.as_str())) {
            (false, _) => (ProviderStatus::Initializing, None, None),
            (true, Some(ProviderState::Connecting)) => (ProviderStatus::Connecting, None, None),
            (true, Some(ProviderState::Connected { account, chain_id })) => {
                (ProviderStatus::Connected, Some(account.clone()), Some(chain_id.clone()))
            }
            (true, None) if handle.is_none() => (ProviderStatus::Unavailable, None, None),
            (true, None) => (ProviderStatus::NotConnected, None, None),
        };

        Ok(ProviderView { key, status, account, chain_id, handle, session: self.clone() })
    }

    /// Views of every registered provider, in registration order.
    pub fn providers(&self) -> Vec<ProviderView> {
        self.connectors().keys().filter_map(|key| self.provider(key.as_str()).ok()).collect()
    }

    pub fn connected_provider(&self, key: &str) -> Result<ConnectedProvider, SessionError> {
        let view = self.provider(key)?;
        match (view.status, view.account, view.chain_id) {
            (ProviderStatus::Connected, Some(account), Some(chain_id)) => Ok(ConnectedProvider {
                key: view.key,
                account,
                chain_id,
                handle: view.handle,
                session: view.session,
            }),
            _ => Err(SessionError::NotConnected(view.key.to_string())),
        }
    }

    pub fn selected_provider(&self) -> Result<ConnectedProvider, SessionError> {
        let selected = self.snapshot().state.selected_provider;
        match selected {
            Some(key) => self.connected_provider(key.as_str()),
            None => Err(SessionError::NoProviderSelected),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::connector::Connectors;
    use crate::core::Action;
    use crate::store::{DurableKeyStore, MemoryBackend};
    use crate::testing::MockConnector;

    fn session() -> Session {
        let connectors = Connectors::new()
            .with("A", Arc::new(MockConnector::new("a")))
            .with("B", Arc::new(MockConnector::new("b").unavailable()));
        Session::new(connectors, Arc::new(DurableKeyStore::new(MemoryBackend::new()))).unwrap()
    }

    #[tokio::test]
    async fn status_before_and_after_ready() {
        let session = session();
        assert_eq!(session.provider("A").unwrap().status, ProviderStatus::Initializing);

        session.synchronize().await;
        assert_eq!(session.provider("A").unwrap().status, ProviderStatus::NotConnected);
        assert_eq!(session.provider("B").unwrap().status, ProviderStatus::Unavailable);
        assert!(session.provider("A").unwrap().handle.is_some());
    }

    #[tokio::test]
    async fn connecting_and_connected_carry_live_state() {
        let session = session();
        session.synchronize().await;

        session.dispatch(Action::Connecting { key: "A".into() });
        assert_eq!(session.provider("A").unwrap().status, ProviderStatus::Connecting);
        assert!(matches!(session.connected_provider("A"), Err(SessionError::NotConnected(_))));

        session.dispatch(Action::Connected { key: "A".into(), accounts: vec!["0xabc".into()], chain_id: "0x1".into() });
        let view = session.provider("A").unwrap();
        assert!(view.is_connected());
        assert_eq!(view.account.as_deref(), Some("0xabc"));
        assert_eq!(view.chain_id.as_deref(), Some("0x1"));

        let selected = session.selected_provider().unwrap();
        assert_eq!(selected.key, "A");
        assert_eq!(selected.account, "0xabc");
    }

    #[tokio::test]
    async fn selected_provider_requires_selection() {
        let session = session();
        session.synchronize().await;
        assert_eq!(session.selected_provider().unwrap_err(), SessionError::NoProviderSelected);
        assert_eq!(session.provider("Z").unwrap_err(), SessionError::NotRegistered("Z".into()));
    }

    #[tokio::test]
    async fn view_serializes_without_session() {
        let session = session();
        session.synchronize().await;
        let json = serde_json::to_value(session.providers()).unwrap();
        assert_eq!(json, serde_json::json!([
            { "key": "A", "status": "notConnected" },
            { "key": "B", "status": "unavailable" },
        ]));
    }
}
