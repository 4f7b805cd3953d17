//! InjectedConnector - wallets exposing an EIP-1193 request/event provider

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{AccountsCallback, ChainCallback, Connection, Connector, ConnectorError, ProviderHandle, Subscription};
use crate::core::paths::eip1193;

pub type ProviderListener = Arc<dyn Fn(Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Minimal EIP-1193 surface: JSON-RPC style requests plus event listeners.
#[async_trait]
pub trait Eip1193Provider: Send + Sync + 'static {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ConnectorError>;
    fn on(&self, event: &str, listener: ProviderListener) -> ListenerId;
    fn remove_listener(&self, event: &str, id: ListenerId);
    fn is_metamask(&self) -> bool { false }
}

pub struct InjectedConnector<P> {
    id: String,
    provider: Option<Arc<P>>,
    require_metamask: bool,
}

impl<P: Eip1193Provider> InjectedConnector<P> {
    pub fn new(id: impl Into<String>, provider: Option<Arc<P>>) -> Self {
        Self { id: id.into(), provider, require_metamask: false }
    }

    /// Only treats the provider as available when it identifies as MetaMask.
    pub fn metamask(provider: Option<Arc<P>>) -> Self {
        Self { id: "metamask_connector".into(), provider, require_metamask: true }
    }

    fn provider(&self) -> Option<&Arc<P>> {
        self.provider.as_ref().filter(|p| !self.require_metamask || p.is_metamask())
    }

    fn available(&self) -> Result<&Arc<P>, ConnectorError> {
        self.provider().ok_or_else(|| ConnectorError::Unavailable(self.id.clone()))
    }

    fn listen(&self, event: &'static str, listener: ProviderListener) -> Result<Subscription, ConnectorError> {
        let provider = self.available()?.clone();
        let id = provider.on(event, listener);
        Ok(Subscription::new(move || provider.remove_listener(event, id)))
    }
}

async fn request_chain_id<P: Eip1193Provider>(provider: &P) -> Result<String, ConnectorError> {
    let raw = provider.request(eip1193::CHAIN_ID, json!([])).await?;
    format_chain_id(&raw).ok_or_else(|| ConnectorError::InvalidResponse(format!("chain id: {raw}")))
}

async fn request_accounts<P: Eip1193Provider>(provider: &P, method: &str) -> Result<Vec<String>, ConnectorError> {
    let raw = provider.request(method, json!([])).await?;
    parse_accounts(&raw).ok_or_else(|| ConnectorError::InvalidResponse(format!("accounts: {raw}")))
}

/// Accepts `"0x1"` strings as-is and turns numeric ids into `0x`-prefixed hex.
pub(crate) fn format_chain_id(raw: &Value) -> Option<String> {
    match raw {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n.as_u64().map(|n| format!("0x{n:x}")),
        _ => None,
    }
}

pub(crate) fn parse_accounts(raw: &Value) -> Option<Vec<String>> {
    raw.as_array()?.iter().map(|a| a.as_str().map(str::to_string)).collect()
}

#[async_trait]
impl<P: Eip1193Provider> Connector for InjectedConnector<P> {
    fn id(&self) -> &str { &self.id }

    fn handle(&self) -> Option<ProviderHandle> { self.provider().cloned().map(ProviderHandle::new) }

    fn subscribe_accounts_changed(&self, callback: AccountsCallback) -> Result<Subscription, ConnectorError> {
        let id = self.id.clone();
        self.listen(eip1193::ACCOUNTS_CHANGED, Arc::new(move |raw| match parse_accounts(&raw) {
            Some(accounts) => callback(accounts),
            None => tracing::warn!(connector = %id, %raw, "malformed accountsChanged payload"),
        }))
    }

    fn subscribe_chain_changed(&self, callback: ChainCallback) -> Result<Subscription, ConnectorError> {
        let id = self.id.clone();
        self.listen(eip1193::CHAIN_CHANGED, Arc::new(move |raw| match format_chain_id(&raw) {
            Some(chain_id) => callback(chain_id),
            None => tracing::warn!(connector = %id, %raw, "malformed chainChanged payload"),
        }))
    }

    async fn synchronize(&self) -> Result<Option<Connection>, ConnectorError> {
        let Some(provider) = self.provider() else { return Ok(None) };
        let chain_id = request_chain_id(provider.as_ref()).await?;
        let accounts = request_accounts(provider.as_ref(), eip1193::ACCOUNTS).await?;
        if accounts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Connection::new(accounts, chain_id)))
    }

    async fn connect(&self) -> Result<Connection, ConnectorError> {
        let provider = self.available()?;
        let attempt = async {
            let chain_id = request_chain_id(provider.as_ref()).await?;
            let accounts = request_accounts(provider.as_ref(), eip1193::REQUEST_ACCOUNTS).await?;
            Ok::<_, ConnectorError>(Connection::new(accounts, chain_id))
        };
        attempt.await.map_err(|e| ConnectorError::Rejected(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> { Ok(()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_ids_normalize_to_hex() {
        assert_eq!(format_chain_id(&json!("0x1")), Some("0x1".into()));
        assert_eq!(format_chain_id(&json!(137)), Some("0x89".into()));
        assert_eq!(format_chain_id(&json!("")), None);
        assert_eq!(format_chain_id(&json!(null)), None);
    }

    #[test]
    fn accounts_must_be_strings() {
        assert_eq!(parse_accounts(&json!(["0xa", "0xb"])), Some(vec!["0xa".into(), "0xb".into()]));
        assert_eq!(parse_accounts(&json!([])), Some(vec![]));
        assert_eq!(parse_accounts(&json!([4])), None);
        assert_eq!(parse_accounts(&json!({"a": 1})), None);
    }
}
