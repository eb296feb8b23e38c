//! Client registry: one live session at most
//!
//! Maps session identities to their state machines and enforces the single
//! live slot: connecting under one identity first retires every machine
//! held under a different identity. Reconnecting under an identity that
//! already has a machine reuses it, so its in-flight guard and pending
//! reconnect stay intact.

use crate::config::{ConnectionConfig, ConnectionIdentity};
use crate::error::SessionResult;
use crate::network::NetworkObserver;
use crate::session::inbound::InboundRouter;
use crate::session::machine::{ConnectOutcome, ConnectionStateMachine, SessionNotice};
use crate::session::state::ConnectionState;
use crate::storage::ConfigStore;
use crate::transport::TransportFactory;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

pub struct ClientRegistry {
    factory: Arc<dyn TransportFactory>,
    store: Arc<dyn ConfigStore>,
    network: Arc<dyn NetworkObserver>,
    router: Arc<Mutex<InboundRouter>>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    clients: Mutex<HashMap<ConnectionIdentity, Arc<ConnectionStateMachine>>>,
}

impl ClientRegistry {
    pub fn new(
        factory: Arc<dyn TransportFactory>,
        store: Arc<dyn ConfigStore>,
        network: Arc<dyn NetworkObserver>,
        router: Arc<Mutex<InboundRouter>>,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Self {
        Self {
            factory,
            store,
            network,
            router,
            notices,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Connect under the config's identity, retiring any machine held
    /// under a different identity first
    pub async fn connect(
        &self,
        config: ConnectionConfig,
        is_new_connect: bool,
    ) -> SessionResult<ConnectOutcome> {
        let identity = config.identity();

        let (machine, retired) = {
            let mut clients = self.clients.lock().await;

            let superseded: Vec<ConnectionIdentity> = clients
                .keys()
                .filter(|held| **held != identity)
                .cloned()
                .collect();
            let retired: Vec<Arc<ConnectionStateMachine>> = superseded
                .into_iter()
                .filter_map(|held| clients.remove(&held))
                .collect();

            let machine = match clients.get(&identity) {
                Some(existing) => {
                    existing.update_config(config).await;
                    Arc::clone(existing)
                }
                None => {
                    let (transport, events) = self.factory.create();
                    let machine = ConnectionStateMachine::spawn(
                        config,
                        transport,
                        events,
                        Arc::clone(&self.store),
                        Arc::clone(&self.network),
                        Arc::clone(&self.router),
                        self.notices.clone(),
                    )
                    .await;
                    clients.insert(identity.clone(), Arc::clone(&machine));
                    machine
                }
            };
            (machine, retired)
        };

        for old in retired {
            info!(identity = %old.identity(), "retiring session superseded by {identity}");
            if let Err(e) = old.disconnect(false).await {
                warn!(identity = %old.identity(), "retired session disconnect failed: {e}");
            }
            old.shutdown().await;
        }

        machine.connect(is_new_connect).await
    }

    /// Disconnect every held machine
    ///
    /// With `stop_background_work` the machines are also retired outright:
    /// event pumps stopped and entries removed. Without it they stay
    /// registered, so a later connect under the same identity reuses them.
    /// `fully_exit` persists the exit flag even when nothing is held, so a
    /// late "fully exit" after a failure still suppresses resumes.
    pub async fn disconnect_all(
        &self,
        stop_background_work: bool,
        fully_exit: bool,
    ) -> SessionResult<()> {
        let machines: Vec<Arc<ConnectionStateMachine>> = {
            let mut clients = self.clients.lock().await;
            if stop_background_work {
                clients.drain().map(|(_, machine)| machine).collect()
            } else {
                clients.values().cloned().collect()
            }
        };

        if machines.is_empty() {
            if fully_exit {
                self.store.set_exit_flag(true)?;
            }
            return Ok(());
        }

        for machine in machines {
            if let Err(e) = machine.disconnect(fully_exit).await {
                warn!(identity = %machine.identity(), "disconnect failed: {e}");
            }
            if stop_background_work {
                machine.shutdown().await;
            }
        }
        Ok(())
    }

    /// Whether any held session is live on the wire
    pub async fn any_connected(&self) -> bool {
        self.clients
            .lock()
            .await
            .values()
            .any(|machine| machine.is_connected())
    }

    /// Snapshot of held sessions and their states
    pub async fn session_states(&self) -> Vec<(ConnectionIdentity, ConnectionState)> {
        self.clients
            .lock()
            .await
            .iter()
            .map(|(identity, machine)| (identity.clone(), machine.state()))
            .collect()
    }
}
