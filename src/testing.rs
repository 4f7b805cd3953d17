//! Test doubles for connectors and EIP-1193 providers
//!
//! `MockConnector` scripts the `Connector` contract directly and counts what
//! the session does with it. `MockProvider` sits one level lower, under an
//! `InjectedConnector`, and answers JSON-RPC style requests from a table.
//! Both invoke listeners outside their own locks, so a listener may drop
//! subscriptions on the same double while it runs.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;

use crate::connector::{
    AccountsCallback, ChainCallback, Connection, Connector, ConnectorError, Eip1193Provider, ListenerId,
    ProviderHandle, ProviderListener, Subscription,
};
use crate::core::paths::eip1193;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(|p| p.into_inner()) }

type Listeners<T> = Mutex<Vec<(u64, Arc<dyn Fn(T) + Send + Sync>)>>;

#[derive(Default)]
struct MockListeners {
    next: AtomicU64,
    total: AtomicUsize,
    accounts: Listeners<Vec<String>>,
    chain: Listeners<String>,
}

impl MockListeners {
    fn id(&self) -> u64 {
        self.total.fetch_add(1, Ordering::SeqCst);
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// Scripted connector. Defaults: available, not authorized on synchronize,
/// connect succeeds with account `0x1` on chain `0x1`.
pub struct MockConnector {
    id: String,
    available: bool,
    wallet: Arc<String>,
    connect_result: Mutex<Result<Connection, ConnectorError>>,
    synchronize_result: Mutex<Result<Option<Connection>, ConnectorError>>,
    disconnect_result: Mutex<Result<(), ConnectorError>>,
    gate: Option<Arc<Notify>>,
    connect_calls: AtomicUsize,
    synchronize_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    listeners: Arc<MockListeners>,
}

impl MockConnector {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            wallet: Arc::new(id.clone()),
            id,
            available: true,
            connect_result: Mutex::new(Ok(Connection::new(vec!["0x1".into()], "0x1"))),
            synchronize_result: Mutex::new(Ok(None)),
            disconnect_result: Mutex::new(Ok(())),
            gate: None,
            connect_calls: AtomicUsize::new(0),
            synchronize_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            listeners: Arc::new(MockListeners::default()),
        }
    }

    /// No provider behind it: no handle, subscriptions refused, never authorized.
    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn with_connect(self, result: Result<Connection, ConnectorError>) -> Self {
        self.set_connect(result);
        self
    }

    pub fn with_synchronize(self, result: Result<Option<Connection>, ConnectorError>) -> Self {
        self.set_synchronize(result);
        self
    }

    pub fn with_disconnect(self, result: Result<(), ConnectorError>) -> Self {
        *lock(&self.disconnect_result) = result;
        self
    }

    /// `connect()` and `synchronize()` wait for `release()` before answering.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Notify::new()));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }

    pub fn set_connect(&self, result: Result<Connection, ConnectorError>) { *lock(&self.connect_result) = result }

    pub fn set_synchronize(&self, result: Result<Option<Connection>, ConnectorError>) {
        *lock(&self.synchronize_result) = result
    }

    pub fn connect_calls(&self) -> usize { self.connect_calls.load(Ordering::SeqCst) }
    pub fn synchronize_calls(&self) -> usize { self.synchronize_calls.load(Ordering::SeqCst) }
    pub fn disconnect_calls(&self) -> usize { self.disconnect_calls.load(Ordering::SeqCst) }

    /// Subscriptions currently registered (accounts and chain together).
    pub fn live_subscriptions(&self) -> usize {
        lock(&self.listeners.accounts).len() + lock(&self.listeners.chain).len()
    }

    /// Subscriptions ever registered.
    pub fn total_subscriptions(&self) -> usize { self.listeners.total.load(Ordering::SeqCst) }

    pub fn emit_accounts(&self, accounts: Vec<String>) {
        let listeners: Vec<_> = lock(&self.listeners.accounts).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(accounts.clone());
        }
    }

    pub fn emit_chain(&self, chain_id: &str) {
        let listeners: Vec<_> = lock(&self.listeners.chain).iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(chain_id.to_string());
        }
    }

    fn unavailable_error(&self) -> ConnectorError { ConnectorError::Unavailable(self.id.clone()) }

    async fn wait_gate(&self) {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn id(&self) -> &str { &self.id }

    fn handle(&self) -> Option<ProviderHandle> {
        self.available.then(|| ProviderHandle::new(self.wallet.clone()))
    }

    fn subscribe_accounts_changed(&self, callback: AccountsCallback) -> Result<Subscription, ConnectorError> {
        if !self.available {
            return Err(self.unavailable_error());
        }
        let id = self.listeners.id();
        lock(&self.listeners.accounts).push((id, Arc::from(callback)));
        let listeners = self.listeners.clone();
        Ok(Subscription::new(move || lock(&listeners.accounts).retain(|(i, _)| *i != id)))
    }

    fn subscribe_chain_changed(&self, callback: ChainCallback) -> Result<Subscription, ConnectorError> {
        if !self.available {
            return Err(self.unavailable_error());
        }
        let id = self.listeners.id();
        lock(&self.listeners.chain).push((id, Arc::from(callback)));
        let listeners = self.listeners.clone();
        Ok(Subscription::new(move || lock(&listeners.chain).retain(|(i, _)| *i != id)))
    }

    async fn synchronize(&self) -> Result<Option<Connection>, ConnectorError> {
        self.synchronize_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        if !self.available {
            return Ok(None);
        }
        lock(&self.synchronize_result).clone()
    }

    async fn connect(&self) -> Result<Connection, ConnectorError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        self.wait_gate().await;
        if !self.available {
            return Err(self.unavailable_error());
        }
        lock(&self.connect_result).clone()
    }

    async fn disconnect(&self) -> Result<(), ConnectorError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.disconnect_result).clone()
    }
}

/// In-memory EIP-1193 provider. Unmocked methods fail with `Io`.
pub struct MockProvider {
    metamask: bool,
    responses: Mutex<HashMap<String, Result<Value, ConnectorError>>>,
    requests: Mutex<Vec<String>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, ProviderListener)>>>,
    next: AtomicU64,
    authorized: AtomicBool,
}

impl Default for MockProvider {
    fn default() -> Self { Self::new() }
}

impl MockProvider {
    /// Chain `0x1`, no authorized accounts, `eth_requestAccounts` rejected.
    pub fn new() -> Self {
        let provider = Self {
            metamask: false,
            responses: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            listeners: Mutex::new(HashMap::new()),
            next: AtomicU64::new(0),
            authorized: AtomicBool::new(false),
        };
        provider.mock_chain_id("0x1");
        provider.mock_request(eip1193::ACCOUNTS, Ok(json!([])));
        provider.mock_request(
            eip1193::REQUEST_ACCOUNTS,
            Err(ConnectorError::Rejected("User rejected the request.".into())),
        );
        provider
    }

    pub fn metamask() -> Self { Self { metamask: true, ..Self::new() } }

    pub fn mock_request(&self, method: &str, response: Result<Value, ConnectorError>) {
        lock(&self.responses).insert(method.to_string(), response);
    }

    pub fn mock_chain_id(&self, chain_id: &str) { self.mock_request(eip1193::CHAIN_ID, Ok(json!(chain_id))) }

    /// Accounts the wallet would hand out. `eth_accounts` only reports them
    /// once `eth_requestAccounts` succeeded or `authorize()` was called.
    pub fn mock_accounts(&self, accounts: &[&str]) {
        self.mock_request(eip1193::REQUEST_ACCOUNTS, Ok(json!(accounts)));
        if self.authorized.load(Ordering::SeqCst) {
            self.mock_request(eip1193::ACCOUNTS, Ok(json!(accounts)));
        }
    }

    /// Marks the dapp as already approved, so `eth_accounts` answers.
    pub fn authorize(&self) {
        self.authorized.store(true, Ordering::SeqCst);
        let granted = lock(&self.responses).get(eip1193::REQUEST_ACCOUNTS).cloned();
        if let Some(Ok(accounts)) = granted {
            self.mock_request(eip1193::ACCOUNTS, Ok(accounts));
        }
    }

    /// Methods requested so far, in order.
    pub fn requests(&self) -> Vec<String> { lock(&self.requests).clone() }

    pub fn listener_count(&self, event: &str) -> usize { lock(&self.listeners).get(event).map_or(0, Vec::len) }

    pub fn emit(&self, event: &str, payload: Value) {
        let listeners: Vec<ProviderListener> = lock(&self.listeners)
            .get(event)
            .map(|ls| ls.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in listeners {
            listener(payload.clone());
        }
    }
}

#[async_trait]
impl Eip1193Provider for MockProvider {
    async fn request(&self, method: &str, _params: Value) -> Result<Value, ConnectorError> {
        lock(&self.requests).push(method.to_string());
        let response = lock(&self.responses)
            .get(method)
            .cloned()
            .unwrap_or_else(|| Err(ConnectorError::Io(format!("unsupported method {method}"))));
        if method == eip1193::REQUEST_ACCOUNTS && response.is_ok() {
            self.authorize();
        }
        response
    }

    fn on(&self, event: &str, listener: ProviderListener) -> ListenerId {
        let id = ListenerId(self.next.fetch_add(1, Ordering::SeqCst));
        lock(&self.listeners).entry(event.to_string()).or_default().push((id, listener));
        id
    }

    fn remove_listener(&self, event: &str, id: ListenerId) {
        if let Some(listeners) = lock(&self.listeners).get_mut(event) {
            listeners.retain(|(i, _)| *i != id);
        }
    }

    fn is_metamask(&self) -> bool { self.metamask }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_connector_counts_calls() {
        let connector = MockConnector::new("a").with_synchronize(Ok(Some(Connection::new(vec!["0x9".into()], "0x5"))));
        assert_eq!(connector.synchronize().await.unwrap().unwrap().chain_id, "0x5");
        assert_eq!(connector.connect().await.unwrap().accounts, vec!["0x1".to_string()]);
        connector.disconnect().await.unwrap();
        assert_eq!((connector.synchronize_calls(), connector.connect_calls(), connector.disconnect_calls()), (1, 1, 1));
    }

    #[test]
    fn listener_may_unsubscribe_itself() {
        let connector = MockConnector::new("a");
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let inner = slot.clone();
        let sub = connector
            .subscribe_accounts_changed(Box::new(move |_| { inner.lock().unwrap().take(); }))
            .unwrap();
        *slot.lock().unwrap() = Some(sub);
        connector.emit_accounts(vec![]);
        assert_eq!(connector.live_subscriptions(), 0);
        assert_eq!(connector.total_subscriptions(), 1);
    }

    #[tokio::test]
    async fn provider_authorizes_after_request_accounts() {
        let provider = MockProvider::metamask();
        provider.mock_accounts(&["0xabc"]);
        assert_eq!(provider.request(eip1193::ACCOUNTS, json!([])).await.unwrap(), json!([]));
        provider.request(eip1193::REQUEST_ACCOUNTS, json!([])).await.unwrap();
        assert_eq!(provider.request(eip1193::ACCOUNTS, json!([])).await.unwrap(), json!(["0xabc"]));
        assert!(provider.request("eth_sign", json!([])).await.is_err());
    }
}
