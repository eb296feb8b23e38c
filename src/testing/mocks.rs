//! Mock implementations of the external seams

use crate::config::ConnectionConfig;
use crate::network::NetworkObserver;
use crate::notify::{AppStateObserver, NotificationPresenter};
use crate::storage::{ConfigStore, StorageError};
use crate::transport::{
    ConnectOptions, TransportClient, TransportError, TransportEvent, TransportFactory,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Scriptable in-memory transport
///
/// Connect and subscribe outcomes are queued ahead of time; an empty queue
/// means success. Every call is recorded for assertions, including the
/// tokio instant of each connect so paused-clock tests can verify retry
/// spacing.
#[derive(Default)]
pub struct MockTransport {
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    connected: AtomicBool,
    connect_results: Mutex<VecDeque<Result<(), String>>>,
    subscribe_results: Mutex<VecDeque<Result<(), String>>>,
    subscribed: Mutex<Vec<(String, u8)>>,
    connect_delay: Mutex<Option<Duration>>,
    connect_instants: Mutex<Vec<tokio::time::Instant>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of a future connect call
    pub fn push_connect_result(&self, result: Result<(), String>) {
        self.connect_results.lock().unwrap().push_back(result);
    }

    /// Queue the outcome of a future subscribe call
    pub fn push_subscribe_result(&self, result: Result<(), String>) {
        self.subscribe_results.lock().unwrap().push_back(result);
    }

    /// Delay each connect call, keeping the attempt observable mid-flight
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    pub fn subscribed(&self) -> Vec<(String, u8)> {
        self.subscribed.lock().unwrap().clone()
    }

    pub fn connect_instants(&self) -> Vec<tokio::time::Instant> {
        self.connect_instants.lock().unwrap().clone()
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    async fn connect(&self, _options: &ConnectOptions) -> Result<(), TransportError> {
        self.connect_instants
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.connect_results.lock().unwrap().pop_front();
        match scripted {
            Some(Err(reason)) => Err(TransportError::ConnectFailed(reason)),
            _ => {
                self.connected.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn subscribe(&self, topic_filter: &str, qos: u8) -> Result<(), TransportError> {
        let scripted = self.subscribe_results.lock().unwrap().pop_front();
        match scripted {
            Some(Err(reason)) => Err(TransportError::SubscribeFailed(reason)),
            _ => {
                self.subscribed
                    .lock()
                    .unwrap()
                    .push((topic_filter.to_string(), qos));
                Ok(())
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Factory handing out [`MockTransport`]s and keeping hold of both the
/// transports and their event senders so tests can script wire activity
#[derive(Default)]
pub struct MockTransportFactory {
    transports: Mutex<Vec<Arc<MockTransport>>>,
    event_senders: Mutex<Vec<mpsc::Sender<TransportEvent>>>,
    pending_connect_results: Mutex<VecDeque<Result<(), String>>>,
    pending_subscribe_results: Mutex<VecDeque<Result<(), String>>>,
    connect_delay: Mutex<Option<Duration>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connect outcome for the next transport this factory creates
    pub fn push_connect_result(&self, result: Result<(), String>) {
        self.pending_connect_results
            .lock()
            .unwrap()
            .push_back(result);
    }

    pub fn push_subscribe_result(&self, result: Result<(), String>) {
        self.pending_subscribe_results
            .lock()
            .unwrap()
            .push_back(result);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    pub fn created_count(&self) -> usize {
        self.transports.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> Arc<MockTransport> {
        Arc::clone(&self.transports.lock().unwrap()[index])
    }

    /// Event sender for the most recently created transport
    pub fn last_event_sender(&self) -> mpsc::Sender<TransportEvent> {
        self.event_senders
            .lock()
            .unwrap()
            .last()
            .expect("no transport created yet")
            .clone()
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> (Arc<dyn TransportClient>, mpsc::Receiver<TransportEvent>) {
        let transport = Arc::new(MockTransport::new());

        for result in self.pending_connect_results.lock().unwrap().drain(..) {
            transport.push_connect_result(result);
        }
        for result in self.pending_subscribe_results.lock().unwrap().drain(..) {
            transport.push_subscribe_result(result);
        }
        if let Some(delay) = *self.connect_delay.lock().unwrap() {
            transport.set_connect_delay(delay);
        }

        let (events_tx, events_rx) = mpsc::channel(32);
        self.transports.lock().unwrap().push(Arc::clone(&transport));
        self.event_senders.lock().unwrap().push(events_tx);

        (transport, events_rx)
    }
}

/// In-memory [`ConfigStore`]
#[derive(Default)]
pub struct MemoryConfigStore {
    record: Mutex<Option<ConnectionConfig>>,
    exit: AtomicBool,
    save_calls: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(config: ConnectionConfig) -> Self {
        let store = Self::default();
        *store.record.lock().unwrap() = Some(config);
        store
    }

    /// Make every save fail, for exercising the best-effort persist path
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn save_count(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn record(&self) -> Option<ConnectionConfig> {
        self.record.lock().unwrap().clone()
    }

    pub fn set_exit(&self, exit: bool) {
        self.exit.store(exit, Ordering::SeqCst);
    }

    pub fn exit(&self) -> bool {
        self.exit.load(Ordering::SeqCst)
    }
}

impl ConfigStore for MemoryConfigStore {
    fn save(&self, config: &ConnectionConfig) -> Result<(), StorageError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Io(io::Error::other("save disabled")));
        }
        *self.record.lock().unwrap() = Some(config.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<ConnectionConfig>, StorageError> {
        Ok(self.record.lock().unwrap().clone())
    }

    fn set_exit_flag(&self, exit: bool) -> Result<(), StorageError> {
        self.exit.store(exit, Ordering::SeqCst);
        Ok(())
    }

    fn exit_flag(&self) -> Result<bool, StorageError> {
        Ok(self.exit.load(Ordering::SeqCst))
    }
}

/// Reachability oracle with a settable answer
pub struct StaticNetworkObserver {
    reachable: AtomicBool,
}

impl StaticNetworkObserver {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }
}

impl NetworkObserver for StaticNetworkObserver {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Presenter capturing every shown notification as `(title, body)`
#[derive(Default)]
pub struct RecordingPresenter {
    shown: Mutex<Vec<(String, String)>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap().clone()
    }
}

impl NotificationPresenter for RecordingPresenter {
    fn show(&self, title: &str, body: &str, _icon_ref: Option<&str>, _open_target: Option<&str>) {
        self.shown
            .lock()
            .unwrap()
            .push((title.to_string(), body.to_string()));
    }
}

/// App-state observer with a settable answer
pub struct StaticAppState {
    backgrounded: AtomicBool,
}

impl StaticAppState {
    pub fn new(backgrounded: bool) -> Self {
        Self {
            backgrounded: AtomicBool::new(backgrounded),
        }
    }

    pub fn set_backgrounded(&self, backgrounded: bool) {
        self.backgrounded.store(backgrounded, Ordering::SeqCst);
    }
}

impl AppStateObserver for StaticAppState {
    fn is_backgrounded(&self) -> bool {
        self.backgrounded.load(Ordering::SeqCst)
    }
}
