//! rumqttc-backed transport client
//!
//! Wraps the rumqttc v5 `AsyncClient` behind the [`TransportClient`] seam:
//! each connect builds a fresh client and spawns an event pump that polls
//! the event loop, reports the first ConnAck (or the first error) back to
//! the connect call, and translates subsequent packets into
//! [`TransportEvent`]s. Reconnection policy lives in the session core, not
//! here: a lost connection simply ends the pump and emits one
//! `ConnectionLost` event.

use super::{ConnectOptions, TransportClient, TransportError, TransportEvent, TransportFactory};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

/// Build rumqttc options from a connect request
pub fn configure_options(options: &ConnectOptions) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(&options.broker_url)
        .map_err(|_| TransportError::InvalidBrokerUrl(options.broker_url.clone()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerUrl(options.broker_url.clone()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut mqtt_options = MqttOptions::new(options.client_id.clone(), host, port);

    if url.scheme() == "mqtts" {
        mqtt_options.set_transport(RumqttcTransport::tls_with_default_config());
    }

    mqtt_options.set_credentials(options.user_name.as_str(), options.password.as_str());
    mqtt_options.set_keep_alive(options.keep_alive);

    Ok(mqtt_options)
}

struct PumpHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Production [`TransportClient`] over rumqttc v5
pub struct RumqttTransport {
    events_tx: mpsc::Sender<TransportEvent>,
    client: Mutex<Option<AsyncClient>>,
    connected_tx: watch::Sender<bool>,
    connected_rx: watch::Receiver<bool>,
    pump: Mutex<Option<PumpHandle>>,
}

impl RumqttTransport {
    pub fn new(events_tx: mpsc::Sender<TransportEvent>) -> Self {
        let (connected_tx, connected_rx) = watch::channel(false);
        Self {
            events_tx,
            client: Mutex::new(None),
            connected_tx,
            connected_rx,
            pump: Mutex::new(None),
        }
    }

    async fn stop_pump(&self) {
        if let Some(pump) = self.pump.lock().await.take() {
            let _ = pump.shutdown.send(true);
            let abort = pump.task.abort_handle();
            match tokio::time::timeout(Duration::from_secs(2), pump.task).await {
                Ok(Ok(())) => debug!("transport event pump shut down"),
                Ok(Err(e)) if !e.is_cancelled() => {
                    warn!("transport event pump ended with error: {e}");
                }
                Err(_) => {
                    warn!("transport event pump did not stop in time, aborting");
                    abort.abort();
                }
                _ => {}
            }
        }
    }
}

/// Report a pre-ConnAck failure to the pending connect, or a post-ConnAck
/// one as a lost-connection event; never both for the same cause.
async fn report_failure(
    events: &mpsc::Sender<TransportEvent>,
    ack: &mut Option<oneshot::Sender<Result<(), String>>>,
    reason: String,
) {
    match ack.take() {
        Some(ack) => {
            let _ = ack.send(Err(reason));
        }
        None => {
            let _ = events
                .send(TransportEvent::ConnectionLost { reason })
                .await;
        }
    }
}

async fn run_event_pump(
    mut event_loop: EventLoop,
    events: mpsc::Sender<TransportEvent>,
    connected: watch::Sender<bool>,
    ack: oneshot::Sender<Result<(), String>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ack = Some(ack);
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    // One bounded poll flushes a queued DISCONNECT before
                    // the pump stops
                    let _ = tokio::time::timeout(
                        Duration::from_millis(500),
                        event_loop.poll(),
                    )
                    .await;
                    debug!("shutdown signal received, stopping transport event pump");
                    break;
                }
            }
            polled = event_loop.poll() => match polled {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    let _ = connected.send(true);
                    if let Some(ack) = ack.take() {
                        let _ = ack.send(Ok(()));
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let arrived = TransportEvent::MessageArrived {
                        topic: String::from_utf8_lossy(&publish.topic).to_string(),
                        payload: publish.payload.to_vec(),
                    };
                    if events.send(arrived).await.is_err() {
                        break;
                    }
                }
                Ok(Event::Incoming(Packet::PubAck(puback))) => {
                    let _ = events
                        .send(TransportEvent::DeliveryComplete { token: puback.pkid })
                        .await;
                }
                Ok(Event::Incoming(Packet::Disconnect(_))) => {
                    let _ = connected.send(false);
                    report_failure(&events, &mut ack, "broker disconnected".to_string()).await;
                    break;
                }
                Ok(other) => {
                    trace!(target: "rumqtt_transport", "event: {other:?}");
                }
                Err(e) => {
                    let _ = connected.send(false);
                    report_failure(&events, &mut ack, e.to_string()).await;
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl TransportClient for RumqttTransport {
    async fn connect(&self, options: &ConnectOptions) -> Result<(), TransportError> {
        // A connect replaces any previous wire session outright
        self.stop_pump().await;

        let mqtt_options = configure_options(options)?;
        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        *self.client.lock().await = Some(client);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ack_tx, ack_rx) = oneshot::channel();
        let task = tokio::spawn(run_event_pump(
            event_loop,
            self.events_tx.clone(),
            self.connected_tx.clone(),
            ack_tx,
            shutdown_rx,
        ));
        *self.pump.lock().await = Some(PumpHandle {
            shutdown: shutdown_tx,
            task,
        });

        match tokio::time::timeout(options.connect_timeout, ack_rx).await {
            Ok(Ok(Ok(()))) => {
                debug!(broker = %options.broker_url, "broker acknowledged connect");
                Ok(())
            }
            Ok(Ok(Err(reason))) => {
                self.stop_pump().await;
                Err(TransportError::ConnectFailed(reason))
            }
            Ok(Err(_)) => {
                self.stop_pump().await;
                Err(TransportError::ConnectFailed(
                    "event pump ended before broker acknowledgement".to_string(),
                ))
            }
            Err(_) => {
                self.stop_pump().await;
                Err(TransportError::ConnectFailed(
                    "timed out waiting for broker acknowledgement".to_string(),
                ))
            }
        }
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let client = self.client.lock().await.take();
        let result = match client {
            Some(client) => client
                .disconnect()
                .await
                .map_err(|e| TransportError::DisconnectFailed(e.to_string())),
            None => Ok(()),
        };
        let _ = self.connected_tx.send(false);
        // The pump polls once more on the shutdown signal, which flushes
        // the queued disconnect packet
        self.stop_pump().await;
        result
    }

    async fn subscribe(&self, topic_filter: &str, qos: u8) -> Result<(), TransportError> {
        let qos = match qos {
            0 => QoS::AtMostOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtLeastOnce,
        };
        let guard = self.client.lock().await;
        let client = guard
            .as_ref()
            .ok_or_else(|| TransportError::SubscribeFailed("no live session".to_string()))?;
        client
            .subscribe(topic_filter, qos)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }
}

/// Factory producing rumqttc-backed transports
#[derive(Debug, Default, Clone, Copy)]
pub struct RumqttTransportFactory;

impl TransportFactory for RumqttTransportFactory {
    fn create(&self) -> (Arc<dyn TransportClient>, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(32);
        (Arc::new(RumqttTransport::new(events_tx)), events_rx)
    }
}
