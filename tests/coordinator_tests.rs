//! Coordinator façade: validation, resume, and inbound routing

use pushlink::config::ConnectionConfig;
use pushlink::error::SessionError;
use pushlink::network::NetworkObserver;
use pushlink::notify::{AppStateObserver, NotificationPresenter};
use pushlink::session::{ConnectOutcome, SessionCoordinator};
use pushlink::storage::ConfigStore;
use pushlink::testing::mocks::{
    MemoryConfigStore, MockTransportFactory, RecordingPresenter, StaticAppState,
    StaticNetworkObserver,
};
use pushlink::transport::{TransportEvent, TransportFactory};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Harness {
    factory: Arc<MockTransportFactory>,
    store: Arc<MemoryConfigStore>,
    presenter: Arc<RecordingPresenter>,
    app_state: Arc<StaticAppState>,
    coordinator: SessionCoordinator,
}

fn harness() -> Harness {
    let factory = Arc::new(MockTransportFactory::new());
    let store = Arc::new(MemoryConfigStore::new());
    let presenter = Arc::new(RecordingPresenter::new());
    let app_state = Arc::new(StaticAppState::new(false));
    let coordinator = SessionCoordinator::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::clone(&store) as Arc<dyn ConfigStore>,
        Arc::new(StaticNetworkObserver::new(true)) as Arc<dyn NetworkObserver>,
        Arc::clone(&presenter) as Arc<dyn NotificationPresenter>,
        Arc::clone(&app_state) as Arc<dyn AppStateObserver>,
    );
    Harness {
        factory,
        store,
        presenter,
        app_state,
        coordinator,
    }
}

fn config() -> ConnectionConfig {
    ConnectionConfig {
        broker_url: "mqtt://broker.example.com:1883".to_string(),
        device_id: "device-42".to_string(),
        user_name: "alice".to_string(),
        password: "hunter2".to_string(),
        connect_timeout_secs: 30,
        keep_alive_secs: 60,
        notification_title: "Messages".to_string(),
    }
}

async fn deliver(h: &Harness, payload: &[u8]) {
    h.factory
        .last_event_sender()
        .send(TransportEvent::MessageArrived {
            topic: "alice/device-42/news".to_string(),
            payload: payload.to_vec(),
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_validation_fails_fast_without_transport() {
    let h = harness();
    let mut invalid = config();
    invalid.password.clear();

    let result = h.coordinator.connect(invalid).await;
    assert!(matches!(
        result,
        Err(SessionError::InvalidConfig { field: "password" })
    ));
    // Nothing was created, persisted, or retried
    assert_eq!(h.factory.created_count(), 0);
    assert!(h.store.record().is_none());
}

#[tokio::test]
async fn test_resume_without_record() {
    let h = harness();
    let outcome = h.coordinator.resume_last().await.unwrap();
    assert_eq!(outcome, ConnectOutcome::NoPersistedConfig);
    assert_eq!(h.factory.created_count(), 0);
}

#[tokio::test]
async fn test_resume_uses_persisted_record() {
    let h = harness();
    h.store.save(&config()).unwrap();

    let outcome = h.coordinator.resume_last().await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(
        h.factory.transport(0).subscribed(),
        vec![("alice/device-42/#".to_string(), 1)]
    );
}

#[tokio::test]
async fn test_resume_refused_while_exit_flag_set() {
    let h = harness();
    h.store.save(&config()).unwrap();
    h.store.set_exit(true);

    let outcome = h.coordinator.resume_last().await.unwrap();
    assert_eq!(outcome, ConnectOutcome::SuppressedByExitFlag);
    assert_eq!(h.factory.transport(0).connect_count(), 0);
}

#[tokio::test]
async fn test_foreground_messages_reach_subscriber() {
    let h = harness();
    h.coordinator.connect(config()).await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.coordinator.set_message_sender(tx).await;

    deliver(&h, b"hello").await;

    let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.topic, "alice/device-42/news");
    assert_eq!(message.payload, b"hello");
    assert!(h.presenter.shown().is_empty());
}

#[tokio::test]
async fn test_backgrounded_messages_become_notifications() {
    let h = harness();
    h.coordinator.connect(config()).await.unwrap();

    let (tx, mut rx) = mpsc::channel(8);
    h.coordinator.set_message_sender(tx).await;
    h.app_state.set_backgrounded(true);

    deliver(&h, br#"{"title": "Build finished"}"#).await;

    // Presenter sees it; the subscriber does not
    tokio::time::timeout(Duration::from_secs(5), async {
        while h.presenter.shown().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(
        h.presenter.shown(),
        vec![("Messages".to_string(), "Build finished".to_string())]
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_message_sender_replacement() {
    let h = harness();
    h.coordinator.connect(config()).await.unwrap();

    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);

    h.coordinator.set_message_sender(tx_a).await;
    deliver(&h, b"first").await;
    let message = tokio::time::timeout(Duration::from_secs(5), rx_a.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload, b"first");

    h.coordinator.set_message_sender(tx_b).await;
    deliver(&h, b"second").await;
    let message = tokio::time::timeout(Duration::from_secs(5), rx_b.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.payload, b"second");
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn test_notices_available_exactly_once() {
    let h = harness();
    assert!(h.coordinator.take_notices().is_some());
    assert!(h.coordinator.take_notices().is_none());
}
