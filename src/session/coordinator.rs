//! Session coordinator: the host-facing façade
//!
//! One object wires the whole stack together: validation, persistence,
//! the client registry, inbound routing, and the lifecycle notice stream.
//! Hosts construct it once with their seam implementations and drive
//! everything through `connect` / `resume_last` / `disconnect`.

use crate::config::ConnectionConfig;
use crate::error::SessionResult;
use crate::network::NetworkObserver;
use crate::notify::{AppStateObserver, NotificationPresenter};
use crate::session::inbound::{InboundMessage, InboundRouter};
use crate::session::machine::{ConnectOutcome, SessionNotice};
use crate::session::registry::ClientRegistry;
use crate::session::state::ConnectionState;
use crate::storage::ConfigStore;
use crate::transport::TransportFactory;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::info;

pub struct SessionCoordinator {
    registry: ClientRegistry,
    store: Arc<dyn ConfigStore>,
    router: Arc<Mutex<InboundRouter>>,
    notices: std::sync::Mutex<Option<mpsc::UnboundedReceiver<SessionNotice>>>,
}

impl SessionCoordinator {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn ConfigStore>,
        network: Arc<dyn NetworkObserver>,
        presenter: Arc<dyn NotificationPresenter>,
        app_state: Arc<dyn AppStateObserver>,
    ) -> Self {
        let router = Arc::new(Mutex::new(InboundRouter::new(presenter, app_state)));
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let registry = ClientRegistry::new(
            factory,
            Arc::clone(&store),
            network,
            Arc::clone(&router),
            notice_tx,
        );

        Self {
            registry,
            store,
            router,
            notices: std::sync::Mutex::new(Some(notice_rx)),
        }
    }

    /// Fresh user-initiated connect; validates, then establishes the
    /// session under the config's identity
    pub async fn connect(&self, config: ConnectionConfig) -> SessionResult<ConnectOutcome> {
        config.validate()?;
        info!(identity = %config.identity(), "connect requested");
        self.registry.connect(config, true).await
    }

    /// Resume the last persisted session, typically on app start or when
    /// connectivity returns; refused while the exit flag is set, a no-op
    /// without a persisted record
    pub async fn resume_last(&self) -> SessionResult<ConnectOutcome> {
        let Some(config) = self.store.load()? else {
            info!("resume requested but no connection record is persisted");
            return Ok(ConnectOutcome::NoPersistedConfig);
        };
        config.validate()?;
        info!(identity = %config.identity(), "resuming persisted session");
        self.registry.connect(config, false).await
    }

    /// Tear down every session
    ///
    /// `stop_background_work` also retires the machines (event pumps
    /// stopped, registry entries removed); `fully_exit` persists the exit
    /// flag so resumes stay refused until the next fresh connect.
    pub async fn disconnect(
        &self,
        stop_background_work: bool,
        fully_exit: bool,
    ) -> SessionResult<()> {
        info!(stop_background_work, fully_exit, "disconnect requested");
        self.registry
            .disconnect_all(stop_background_work, fully_exit)
            .await
    }

    /// Whether any session is currently live on the wire
    pub async fn is_connected(&self) -> bool {
        self.registry.any_connected().await
    }

    /// Register the channel inbound messages are forwarded on; replaces
    /// any previous one starting with the next message
    pub async fn set_message_sender(&self, sender: mpsc::Sender<InboundMessage>) {
        self.router.lock().await.set_sender(Some(sender));
    }

    /// Unregister the message subscriber
    pub async fn clear_message_sender(&self) {
        self.router.lock().await.set_sender(None);
    }

    /// Take the lifecycle notice stream; available exactly once
    pub fn take_notices(&self) -> Option<mpsc::UnboundedReceiver<SessionNotice>> {
        self.notices.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Snapshot of held sessions and their states
    pub async fn session_states(&self) -> Vec<(crate::config::ConnectionIdentity, ConnectionState)> {
        self.registry.session_states().await
    }
}
