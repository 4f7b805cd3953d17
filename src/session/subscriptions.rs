//! SubscriptionManager - one accounts/chain subscription pair per connected key

use std::sync::{Arc, Mutex};

use crate::connector::{Connectors, Subscription};
use crate::core::{Action, ProviderKey};

/// Sink for actions produced by connector notifications.
pub type Dispatcher = Arc<dyn Fn(Action) + Send + Sync>;

#[derive(Default)]
pub struct SubscriptionManager {
    active: Mutex<Active>,
}

type Pair = (ProviderKey, Subscription, Subscription);

#[derive(Default)]
struct Active {
    keys: Vec<ProviderKey>,
    subscriptions: Vec<Pair>,
    // Bumped per accepted sync; a pass superseded before it installs is dropped.
    generation: u64,
    closed: bool,
}

impl SubscriptionManager {
    pub fn new() -> Self { Self::default() }

    fn active(&self) -> std::sync::MutexGuard<'_, Active> { self.active.lock().unwrap_or_else(|p| p.into_inner()) }

    /// Re-subscribes for the connected set returned by `current`, which is
    /// read under the manager lock so the latest set always wins. Previous
    /// subscriptions are dropped and fresh ones taken with the lock released,
    /// so connectors may call back into the session from either path.
    pub fn sync(&self, connectors: &Connectors, current: impl FnOnce() -> Vec<ProviderKey>, dispatch: &Dispatcher) {
        let (keys, generation, stale) = {
            let mut active = self.active();
            if active.closed {
                return;
            }
            let keys = current();
            if keys == active.keys {
                return;
            }
            active.generation += 1;
            active.keys = keys.clone();
            (keys, active.generation, std::mem::take(&mut active.subscriptions))
        };
        drop(stale);

        let mut fresh = Vec::with_capacity(keys.len());
        for key in &keys {
            match subscribe(connectors, key, dispatch) {
                Some(pair) => fresh.push(pair),
                None => tracing::warn!(%key, "connected provider left without change notifications"),
            }
        }

        let mut active = self.active();
        if active.closed || active.generation != generation {
            drop(active);
            tracing::debug!(keys = ?keys, "change subscriptions superseded");
            return;
        }
        let leftover = std::mem::replace(&mut active.subscriptions, fresh);
        drop(active);
        drop(leftover);
        tracing::debug!(keys = ?keys, "change subscriptions refreshed");
    }

    /// Drops every subscription and refuses new ones.
    pub fn close(&self) {
        let stale = {
            let mut active = self.active();
            active.closed = true;
            active.keys.clear();
            std::mem::take(&mut active.subscriptions)
        };
        drop(stale);
    }

    /// Keys that currently hold a live subscription pair.
    pub fn subscribed_keys(&self) -> Vec<ProviderKey> {
        self.active().subscriptions.iter().map(|(key, _, _)| key.clone()).collect()
    }
}

fn subscribe(connectors: &Connectors, key: &ProviderKey, dispatch: &Dispatcher) -> Option<Pair> {
    let Some(connector) = connectors.get(key.as_str()) else {
        tracing::error!(%key, "connector not found while subscribing");
        return None;
    };

    let (k, d) = (key.clone(), dispatch.clone());
    let accounts = connector.subscribe_accounts_changed(Box::new(move |accounts| {
        d(Action::AccountsChanged { key: k.clone(), accounts })
    }));
    let accounts = match accounts {
        Ok(sub) => sub,
        Err(err) => {
            tracing::warn!(%key, %err, "accountsChanged subscription refused");
            return None;
        }
    };

    let (k, d) = (key.clone(), dispatch.clone());
    let chain = connector.subscribe_chain_changed(Box::new(move |chain_id| {
        d(Action::ChainChanged { key: k.clone(), chain_id })
    }));
    match chain {
        Ok(chain) => Some((key.clone(), accounts, chain)),
        Err(err) => {
            tracing::warn!(%key, %err, "chainChanged subscription refused");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{AccountsCallback, ChainCallback, Connection, Connector, ConnectorError, ProviderHandle};
    use crate::testing::MockConnector;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    fn recorder() -> (Dispatcher, Arc<Mutex<Vec<Action>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Arc::new(move |action: Action| sink.lock().unwrap().push(action)), seen)
    }

    fn keys(ks: &[&str]) -> Vec<ProviderKey> { ks.iter().map(|k| ProviderKey::from(*k)).collect() }

    #[test]
    fn one_pair_per_connected_key() {
        let (a, b) = (Arc::new(MockConnector::new("a")), Arc::new(MockConnector::new("b")));
        let connectors = Connectors::new().with("A", a.clone()).with("B", b.clone());
        let (dispatch, _) = recorder();
        let manager = SubscriptionManager::new();

        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        assert_eq!((a.live_subscriptions(), b.live_subscriptions()), (2, 0));

        manager.sync(&connectors, || keys(&["A", "B"]), &dispatch);
        assert_eq!((a.live_subscriptions(), b.live_subscriptions()), (2, 2));
        assert_eq!(a.total_subscriptions(), 4);

        manager.sync(&connectors, || keys(&["B"]), &dispatch);
        assert_eq!((a.live_subscriptions(), b.live_subscriptions()), (0, 2));
        assert_eq!(manager.subscribed_keys(), keys(&["B"]));
    }

    #[test]
    fn unchanged_set_keeps_existing_subscriptions() {
        let a = Arc::new(MockConnector::new("a"));
        let connectors = Connectors::new().with("A", a.clone());
        let (dispatch, _) = recorder();
        let manager = SubscriptionManager::new();

        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        assert_eq!(a.total_subscriptions(), 2);
    }

    #[test]
    fn notifications_become_tagged_actions() {
        let a = Arc::new(MockConnector::new("a"));
        let connectors = Connectors::new().with("A", a.clone());
        let (dispatch, seen) = recorder();
        let manager = SubscriptionManager::new();
        manager.sync(&connectors, || keys(&["A"]), &dispatch);

        a.emit_accounts(vec!["0x2".into()]);
        a.emit_chain("0x5");
        assert_eq!(*seen.lock().unwrap(), vec![
            Action::AccountsChanged { key: "A".into(), accounts: vec!["0x2".into()] },
            Action::ChainChanged { key: "A".into(), chain_id: "0x5".into() },
        ]);
    }

    #[test]
    fn refused_subscription_is_skipped() {
        let a = Arc::new(MockConnector::new("a").unavailable());
        let connectors = Connectors::new().with("A", a.clone());
        let (dispatch, _) = recorder();
        let manager = SubscriptionManager::new();
        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        assert!(manager.subscribed_keys().is_empty());
        assert_eq!(a.live_subscriptions(), 0);
    }

    /// Calls back into the manager whenever it subscribes or unsubscribes,
    /// like a provider that runs listener bookkeeping under its own lock.
    struct ReentrantConnector {
        manager: Weak<SubscriptionManager>,
        calls: Arc<AtomicUsize>,
    }

    impl ReentrantConnector {
        fn touch(manager: &Weak<SubscriptionManager>, calls: &AtomicUsize) {
            if let Some(manager) = manager.upgrade() {
                let _ = manager.subscribed_keys();
            }
            calls.fetch_add(1, Ordering::SeqCst);
        }

        fn subscription(&self) -> Subscription {
            let manager = self.manager.clone();
            Self::touch(&manager, &self.calls);
            let calls = self.calls.clone();
            Subscription::new(move || Self::touch(&manager, &calls))
        }
    }

    #[async_trait]
    impl Connector for ReentrantConnector {
        fn id(&self) -> &str { "reentrant" }
        fn handle(&self) -> Option<ProviderHandle> { None }
        fn subscribe_accounts_changed(&self, _: AccountsCallback) -> Result<Subscription, ConnectorError> {
            Ok(self.subscription())
        }
        fn subscribe_chain_changed(&self, _: ChainCallback) -> Result<Subscription, ConnectorError> {
            Ok(self.subscription())
        }
        async fn synchronize(&self) -> Result<Option<Connection>, ConnectorError> { Ok(None) }
        async fn connect(&self) -> Result<Connection, ConnectorError> { Err(ConnectorError::Rejected("n/a".into())) }
        async fn disconnect(&self) -> Result<(), ConnectorError> { Ok(()) }
    }

    #[test]
    fn connector_callbacks_run_outside_manager_lock() {
        let manager = Arc::new(SubscriptionManager::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let connector = Arc::new(ReentrantConnector { manager: Arc::downgrade(&manager), calls: calls.clone() });
        let connectors = Connectors::new().with("A", connector);
        let (dispatch, _) = recorder();

        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(manager.subscribed_keys(), keys(&["A"]));

        manager.sync(&connectors, Vec::new, &dispatch);
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        manager.close();
        assert_eq!(calls.load(Ordering::SeqCst), 8);
        assert!(manager.subscribed_keys().is_empty());
    }

    #[test]
    fn close_drops_everything_and_blocks_resubscribe() {
        let a = Arc::new(MockConnector::new("a"));
        let connectors = Connectors::new().with("A", a.clone());
        let (dispatch, _) = recorder();
        let manager = SubscriptionManager::new();
        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        manager.close();
        assert_eq!(a.live_subscriptions(), 0);
        manager.sync(&connectors, || keys(&["A"]), &dispatch);
        assert_eq!(a.live_subscriptions(), 0);
    }
}
