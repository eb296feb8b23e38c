//! Registry behavior: one live session, single-flight connects

use pushlink::config::ConnectionConfig;
use pushlink::network::NetworkObserver;
use pushlink::notify::{AppStateObserver, NotificationPresenter};
use pushlink::session::{ConnectOutcome, ConnectionState, SessionCoordinator};
use pushlink::storage::ConfigStore;
use pushlink::testing::mocks::{
    MemoryConfigStore, MockTransportFactory, RecordingPresenter, StaticAppState,
    StaticNetworkObserver,
};
use pushlink::transport::{TransportClient, TransportFactory};
use std::sync::Arc;
use std::time::Duration;

fn harness() -> (Arc<MockTransportFactory>, SessionCoordinator) {
    let factory = Arc::new(MockTransportFactory::new());
    let coordinator = SessionCoordinator::new(
        Arc::clone(&factory) as Arc<dyn TransportFactory>,
        Arc::new(MemoryConfigStore::new()) as Arc<dyn ConfigStore>,
        Arc::new(StaticNetworkObserver::new(true)) as Arc<dyn NetworkObserver>,
        Arc::new(RecordingPresenter::new()) as Arc<dyn NotificationPresenter>,
        Arc::new(StaticAppState::new(false)) as Arc<dyn AppStateObserver>,
    );
    (factory, coordinator)
}

fn config_for(user_name: &str) -> ConnectionConfig {
    ConnectionConfig {
        broker_url: "mqtt://broker.example.com:1883".to_string(),
        device_id: "device-42".to_string(),
        user_name: user_name.to_string(),
        password: "hunter2".to_string(),
        connect_timeout_secs: 30,
        keep_alive_secs: 60,
        notification_title: String::new(),
    }
}

#[tokio::test]
async fn test_repeat_connect_same_identity_is_idempotent() {
    let (factory, coordinator) = harness();

    let first = coordinator.connect(config_for("alice")).await.unwrap();
    let second = coordinator.connect(config_for("alice")).await.unwrap();

    assert_eq!(first, ConnectOutcome::Connected);
    assert_eq!(second, ConnectOutcome::AlreadyConnected);
    assert_eq!(factory.created_count(), 1);
    assert_eq!(factory.transport(0).connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connects_single_flight() {
    let (factory, coordinator) = harness();
    factory.set_connect_delay(Duration::from_millis(100));

    let (first, second) = tokio::join!(
        coordinator.connect(config_for("alice")),
        coordinator.connect(config_for("alice")),
    );

    let outcomes = [first.unwrap(), second.unwrap()];
    assert!(outcomes.contains(&ConnectOutcome::Connected));
    assert!(outcomes.contains(&ConnectOutcome::AttemptInFlight));
    assert_eq!(factory.transport(0).connect_count(), 1);
}

#[tokio::test]
async fn test_new_identity_retires_previous_session() {
    let (factory, coordinator) = harness();

    coordinator.connect(config_for("alice")).await.unwrap();
    let alice_transport = factory.transport(0);
    assert!(alice_transport.is_connected());

    let outcome = coordinator.connect(config_for("bob")).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);

    // Alice's session was torn down before Bob's came up
    assert!(!alice_transport.is_connected());
    assert_eq!(alice_transport.disconnect_count(), 1);
    assert_eq!(factory.created_count(), 2);
    assert!(factory.transport(1).is_connected());

    let states = coordinator.session_states().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0.user_name, "bob");
    assert_eq!(states[0].1, ConnectionState::Connected);
}

#[tokio::test]
async fn test_password_rotation_keeps_identity() {
    let (factory, coordinator) = harness();

    coordinator.connect(config_for("alice")).await.unwrap();
    coordinator.disconnect(true, false).await.unwrap();

    let mut rotated = config_for("alice");
    rotated.password = "new-secret".to_string();
    let outcome = coordinator.connect(rotated).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);

    // Disconnect retired the old machine, so a fresh one was created; the
    // rotated password does not change the identity
    let states = coordinator.session_states().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].0.user_name, "alice");
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test]
async fn test_disconnect_with_stop_retires_all_sessions() {
    let (factory, coordinator) = harness();

    coordinator.connect(config_for("alice")).await.unwrap();
    coordinator.disconnect(true, false).await.unwrap();

    assert!(coordinator.session_states().await.is_empty());
    assert_eq!(factory.transport(0).disconnect_count(), 1);
}

#[tokio::test]
async fn test_disconnect_without_stop_keeps_machine_for_reuse() {
    let (factory, coordinator) = harness();

    coordinator.connect(config_for("alice")).await.unwrap();
    coordinator.disconnect(false, false).await.unwrap();

    let states = coordinator.session_states().await;
    assert_eq!(states.len(), 1);
    assert_eq!(states[0].1, ConnectionState::Disconnected);

    // Reconnecting reuses the same machine and transport
    let outcome = coordinator.connect(config_for("alice")).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(factory.created_count(), 1);
    assert_eq!(factory.transport(0).connect_count(), 2);
}

#[tokio::test]
async fn test_connect_while_retry_pending_reuses_machine() {
    let (factory, coordinator) = harness();
    factory.push_connect_result(Err("refused".to_string()));

    let result = coordinator.connect(config_for("alice")).await;
    assert!(result.is_err());

    // Direct user retry under the same identity goes through the same
    // machine and transport
    let outcome = coordinator.connect(config_for("alice")).await.unwrap();
    assert_eq!(outcome, ConnectOutcome::Connected);
    assert_eq!(factory.created_count(), 1);
    assert_eq!(factory.transport(0).connect_count(), 2);
}
