//! Per-identity connection state machine
//!
//! Owns one transport session end to end: the connect sequence (persist,
//! transport connect, inbound subscribe), failure handling with its
//! single-slot reconnect task, deliberate disconnects, and the event pump
//! translating transport events into deliveries and failure reports.
//!
//! Failure handling is funneled through one path regardless of source, so a
//! failed connect, a failed subscribe, and a dropped connection all leave
//! the session in the same shape: disconnected, one notice published, and a
//! retry armed unless the network is unreachable.

use crate::config::{ConnectionConfig, ConnectionIdentity};
use crate::error::{SessionError, SessionResult};
use crate::network::NetworkObserver;
use crate::session::backoff::ReconnectSchedule;
use crate::session::inbound::InboundRouter;
use crate::session::state::{ConnectionState, FailureKind};
use crate::storage::ConfigStore;
use crate::transport::{
    ConnectOptions, TopicBuilder, TransportClient, TransportEvent, INBOUND_QOS,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a connect request resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session was established and subscribed
    Connected,
    /// The session was already up; nothing was done
    AlreadyConnected,
    /// Another connect attempt is in flight; this one was not started
    AttemptInFlight,
    /// A deliberate disconnect completed while this attempt was on the
    /// wire; the attempt was torn down and the session stays disconnected
    SupersededByDisconnect,
    /// A resume was refused because the persisted exit flag is set
    SuppressedByExitFlag,
    /// A resume found no persisted connection record
    NoPersistedConfig,
}

/// Lifecycle notices published to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    ConnectSucceeded {
        identity: ConnectionIdentity,
    },
    ConnectFailed {
        identity: ConnectionIdentity,
        reason: String,
    },
    DisconnectFinished {
        identity: ConnectionIdentity,
    },
}

struct ReconnectHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// State machine for one logical session identity
pub struct ConnectionStateMachine {
    identity: ConnectionIdentity,
    config: Mutex<ConnectionConfig>,
    transport: Arc<dyn TransportClient>,
    store: Arc<dyn ConfigStore>,
    network: Arc<dyn NetworkObserver>,
    router: Arc<Mutex<InboundRouter>>,
    notices: mpsc::UnboundedSender<SessionNotice>,
    state_tx: watch::Sender<ConnectionState>,
    /// Serializes lifecycle transitions; never held across transport waits
    /// on the connect path, so a second connect observes `Connecting` and
    /// returns instead of queueing
    lifecycle: Mutex<()>,
    reconnect: Mutex<Option<ReconnectHandle>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    pump_shutdown: watch::Sender<bool>,
    /// Self-reference handed to spawned retry loops; set once in `spawn`
    weak_self: OnceLock<Weak<Self>>,
}

impl ConnectionStateMachine {
    /// Build the machine and start its transport event pump
    pub async fn spawn(
        config: ConnectionConfig,
        transport: Arc<dyn TransportClient>,
        events: mpsc::Receiver<TransportEvent>,
        store: Arc<dyn ConfigStore>,
        network: Arc<dyn NetworkObserver>,
        router: Arc<Mutex<InboundRouter>>,
        notices: mpsc::UnboundedSender<SessionNotice>,
    ) -> Arc<Self> {
        let (state_tx, _state_rx) = watch::channel(ConnectionState::Disconnected);
        let (pump_shutdown, shutdown_rx) = watch::channel(false);

        let machine = Arc::new(Self {
            identity: config.identity(),
            config: Mutex::new(config),
            transport,
            store,
            network,
            router,
            notices,
            state_tx,
            lifecycle: Mutex::new(()),
            reconnect: Mutex::new(None),
            pump: Mutex::new(None),
            pump_shutdown,
            weak_self: OnceLock::new(),
        });
        let _ = machine.weak_self.set(Arc::downgrade(&machine));

        let pump = tokio::spawn(Self::run_event_pump(
            Arc::downgrade(&machine),
            events,
            shutdown_rx,
        ));
        *machine.pump.lock().await = Some(pump);

        machine
    }

    pub fn identity(&self) -> &ConnectionIdentity {
        &self.identity
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// True iff the machine reports `Connected` and the transport agrees;
    /// the double-check guards against a wire-level drop the event pump has
    /// not observed yet
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected && self.transport.is_connected()
    }

    /// Watch state transitions as they happen
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Replace the stored connect parameters (same identity, new password
    /// or timing); takes effect on the next attempt
    pub async fn update_config(&self, config: ConnectionConfig) {
        debug_assert_eq!(config.identity(), self.identity);
        *self.config.lock().await = config;
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state_tx.send_replace(next);
        if prev != next {
            info!(identity = %self.identity, %prev, %next, "session state changed");
        }
    }

    /// Establish the session
    ///
    /// `is_new_connect` distinguishes a fresh user request from a resume
    /// (retry or connectivity-restored); resumes are refused while the
    /// persisted exit flag is set.
    pub async fn connect(&self, is_new_connect: bool) -> SessionResult<ConnectOutcome> {
        if !is_new_connect {
            match self.store.exit_flag() {
                Ok(true) => {
                    debug!(identity = %self.identity, "exit flag set, refusing resume");
                    return Ok(ConnectOutcome::SuppressedByExitFlag);
                }
                Ok(false) => {}
                Err(e) => {
                    // Unreadable flag reads as "not exited"
                    warn!(identity = %self.identity, "failed to read exit flag: {e}");
                }
            }
        }

        {
            let _guard = self.lifecycle.lock().await;
            match self.state() {
                ConnectionState::Connected => return Ok(ConnectOutcome::AlreadyConnected),
                state if !state.accepts_connect() => return Ok(ConnectOutcome::AttemptInFlight),
                _ => {}
            }
            self.set_state(ConnectionState::Connecting);
        }

        self.safe_connect().await
    }

    async fn safe_connect(&self) -> SessionResult<ConnectOutcome> {
        let config = self.config.lock().await.clone();

        // Persist before touching the wire so a later resume sees exactly
        // what this attempt used; persistence trouble never blocks connect
        if let Err(e) = self.store.save(&config) {
            warn!(identity = %self.identity, "failed to persist connection record: {e}");
        }
        if let Err(e) = self.store.set_exit_flag(false) {
            warn!(identity = %self.identity, "failed to clear exit flag: {e}");
        }

        let options = ConnectOptions::from_config(&config);
        if let Err(e) = self.transport.connect(&options).await {
            let reason = e.to_string();
            self.handle_failure(FailureKind::Direct, &reason).await;
            return Err(SessionError::connect_failed(reason));
        }

        let filter = TopicBuilder::inbound_filter(&config.user_name, &config.device_id);
        if let Err(e) = self.transport.subscribe(&filter, INBOUND_QOS).await {
            // The transport is up but useless without the subscription
            let reason = e.to_string();
            self.handle_failure(FailureKind::DisconnectFirst, &reason).await;
            return Err(SessionError::connect_failed(reason));
        }

        {
            let _guard = self.lifecycle.lock().await;
            // A deliberate disconnect (or an observed failure) may have
            // completed while we were on the wire; its outcome wins
            if self.state() != ConnectionState::Connecting {
                debug!(identity = %self.identity, state = %self.state(),
                    "connect attempt superseded, tearing down");
                if let Err(e) = self.transport.disconnect().await {
                    debug!(identity = %self.identity, "teardown disconnect reported: {e}");
                }
                return Ok(ConnectOutcome::SupersededByDisconnect);
            }
            self.set_state(ConnectionState::Connected);
        }
        self.cancel_reconnect().await;
        let _ = self.notices.send(SessionNotice::ConnectSucceeded {
            identity: self.identity.clone(),
        });
        info!(identity = %self.identity, %filter, "session established");
        Ok(ConnectOutcome::Connected)
    }

    /// Tear the session down deliberately
    ///
    /// Transport refusal is still terminal: the session ends up
    /// disconnected either way. `fully_exit` additionally persists the exit
    /// flag so later resumes are refused until the next fresh connect.
    pub async fn disconnect(&self, fully_exit: bool) -> SessionResult<()> {
        {
            let _guard = self.lifecycle.lock().await;
            self.set_state(ConnectionState::Disconnecting);
            if let Err(e) = self.transport.disconnect().await {
                debug!(identity = %self.identity, "transport disconnect reported: {e}");
            }
            self.set_state(ConnectionState::Disconnected);
        }

        if fully_exit {
            if let Err(e) = self.store.set_exit_flag(true) {
                warn!(identity = %self.identity, "failed to persist exit flag: {e}");
            }
        }
        self.cancel_reconnect().await;

        let _ = self.notices.send(SessionNotice::DisconnectFinished {
            identity: self.identity.clone(),
        });
        info!(identity = %self.identity, fully_exit, "session disconnected");
        Ok(())
    }

    /// Single funnel for every connection failure
    async fn handle_failure(&self, kind: FailureKind, reason: &str) {
        {
            let _guard = self.lifecycle.lock().await;
            if self.state().failure_is_stale() {
                debug!(identity = %self.identity, %reason, "ignoring stale failure report");
                return;
            }
            if kind == FailureKind::DisconnectFirst {
                if let Err(e) = self.transport.disconnect().await {
                    debug!(identity = %self.identity, "teardown disconnect reported: {e}");
                }
            }
            self.set_state(ConnectionState::Disconnected);
        }

        warn!(identity = %self.identity, %reason, "connection failure");
        let _ = self.notices.send(SessionNotice::ConnectFailed {
            identity: self.identity.clone(),
            reason: reason.to_string(),
        });
        self.try_reconnect().await;
    }

    /// Arm the reconnect task unless one is already pending
    async fn try_reconnect(&self) {
        if !self.network.is_reachable() {
            info!(identity = %self.identity, "network unreachable, not arming reconnect");
            self.cancel_reconnect().await;
            return;
        }

        let mut slot = self.reconnect.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.task.is_finished() {
                return;
            }
        }

        let Some(weak) = self.weak_self.get() else {
            return;
        };
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_reconnect_loop(
            weak.clone(),
            self.identity.clone(),
            cancel_rx,
        ));
        *slot = Some(ReconnectHandle {
            cancel: cancel_tx,
            task,
        });
    }

    /// Cancel any pending reconnect; signal only, the task may be the
    /// caller finishing its own successful attempt
    async fn cancel_reconnect(&self) {
        if let Some(handle) = self.reconnect.lock().await.take() {
            let _ = handle.cancel.send(true);
        }
    }

    /// The pump holds only a weak handle; dropping the last owner ends the
    /// pump on its next event instead of keeping the machine alive
    async fn run_event_pump(
        this: Weak<Self>,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("event pump stopped");
                        break;
                    }
                }
                event = events.recv() => {
                    let Some(machine) = this.upgrade() else { break };
                    match event {
                        Some(TransportEvent::MessageArrived { topic, payload }) => {
                            let title = machine.config.lock().await.notification_title.clone();
                            machine.router.lock().await.deliver(topic, payload, &title).await;
                        }
                        Some(TransportEvent::ConnectionLost { reason }) => {
                            machine.handle_failure(FailureKind::DisconnectFirst, &reason).await;
                        }
                        Some(TransportEvent::DeliveryComplete { token }) => {
                            debug!(identity = %machine.identity, token, "delivery complete");
                        }
                        None => {
                            debug!(identity = %machine.identity, "transport event stream closed");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Stop background work: pending reconnect and the event pump. The
    /// machine is inert afterwards and must not be reused.
    pub async fn shutdown(&self) {
        self.cancel_reconnect().await;
        let _ = self.pump_shutdown.send(true);
        if let Some(task) = self.pump.lock().await.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(Duration::from_secs(2), task).await.is_err() {
                warn!(identity = %self.identity, "event pump did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}

impl Drop for ConnectionStateMachine {
    fn drop(&mut self) {
        // Last handle gone without an explicit shutdown; the background
        // tasks must not outlive the machine
        if let Some(handle) = self.reconnect.get_mut().take() {
            handle.task.abort();
        }
        if let Some(task) = self.pump.get_mut().take() {
            task.abort();
        }
    }
}

/// Self-rearming retry loop; one per machine at most
///
/// Each pass sleeps the current table delay, advances the table, and
/// re-attempts as a resume. Success, an already-up session, a superseding
/// disconnect, or the exit flag end the loop; anything else is retried at
/// the next delay. The cancel signal wins over the sleep. Boxed because
/// the re-attempt can arm this loop again through `connect`.
fn run_reconnect_loop(
    machine: Weak<ConnectionStateMachine>,
    identity: ConnectionIdentity,
    mut cancel: watch::Receiver<bool>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut schedule = ReconnectSchedule::new();
        loop {
            let delay = schedule.current_delay();
            debug!(
                identity = %identity,
                delay_secs = delay.as_secs(),
                "reconnect armed"
            );

            tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!(identity = %identity, "reconnect canceled");
                        return;
                    }
                    continue;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            schedule.advance();
            let Some(machine) = machine.upgrade() else { return };
            match machine.connect(false).await {
                Ok(ConnectOutcome::Connected)
                | Ok(ConnectOutcome::AlreadyConnected)
                | Ok(ConnectOutcome::SupersededByDisconnect)
                | Ok(ConnectOutcome::SuppressedByExitFlag) => return,
                Ok(_) | Err(_) => {}
            }
        }
    })
}
