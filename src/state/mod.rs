pub mod gateway;
pub mod poll;
pub mod registry;
pub mod session;
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock, watch};

use crate::{config::AppConfig, dao::poll_store::PollStore};

pub use self::gateway::BroadcastGateway;
pub use self::registry::{ConnectionId, ConnectionRegistry, Role};
pub use self::session::PollSession;

pub type SharedState = Arc<AppState>;

/// Central application state: the poll session, live connections and the storage handle.
///
/// Lock order is session first, then registry. Code holding the registry lock must not wait
/// on the session.
pub struct AppState {
    config: AppConfig,
    session: Mutex<PollSession>,
    registry: RwLock<ConnectionRegistry>,
    gateway: BroadcastGateway,
    poll_store: RwLock<Option<Arc<dyn PollStore>>>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            session: Mutex::new(PollSession::new()),
            registry: RwLock::new(ConnectionRegistry::new()),
            gateway: BroadcastGateway::new(),
            poll_store: RwLock::new(None),
            degraded: degraded_tx,
        })
    }

    /// Construct state with a store already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn PollStore>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            config,
            session: Mutex::new(PollSession::new()),
            registry: RwLock::new(ConnectionRegistry::new()),
            gateway: BroadcastGateway::new(),
            poll_store: RwLock::new(Some(store)),
            degraded: degraded_tx,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The single poll session of this process.
    pub fn session(&self) -> &Mutex<PollSession> {
        &self.session
    }

    pub fn registry(&self) -> &RwLock<ConnectionRegistry> {
        &self.registry
    }

    pub fn gateway(&self) -> &BroadcastGateway {
        &self.gateway
    }

    /// Obtain a handle to the current poll store, if one is installed.
    pub async fn poll_store(&self) -> Option<Arc<dyn PollStore>> {
        let guard = self.poll_store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle for the realtime path; `None` while degraded.
    pub async fn healthy_poll_store(&self) -> Option<Arc<dyn PollStore>> {
        if self.is_degraded() {
            return None;
        }
        self.poll_store().await
    }

    /// Install a new poll store implementation and leave degraded mode.
    pub async fn install_poll_store(&self, store: Arc<dyn PollStore>) {
        {
            let mut guard = self.poll_store.write().await;
            *guard = Some(store);
        }
        self.set_degraded(false);
    }

    /// Remove the current poll store and enter degraded mode.
    pub async fn clear_poll_store(&self) {
        {
            let mut guard = self.poll_store.write().await;
            guard.take();
        }
        self.set_degraded(true);
    }

    /// Current degraded flag: no store installed, or the installed one failed its health check.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn set_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::poll_store::InMemoryPollStore;

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(*watcher.borrow());

        state
            .install_poll_store(Arc::new(InMemoryPollStore::new()))
            .await;
        assert!(!state.is_degraded());
        watcher.changed().await.unwrap();
        assert!(!*watcher.borrow());

        state.set_degraded(true);
        assert!(state.is_degraded());
        assert!(state.poll_store().await.is_some());

        state.clear_poll_store().await;
        assert!(state.is_degraded());
        assert!(state.poll_store().await.is_none());
    }
}
