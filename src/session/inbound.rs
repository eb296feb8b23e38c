//! Inbound message routing
//!
//! Messages arriving on the inbound subscription go one of two ways: while
//! the hosting application is foregrounded they are forwarded to the
//! registered message subscriber; while it is backgrounded they are
//! rendered as a notification and swallowed. The notification body is the
//! `title` field of the JSON payload when present.

use crate::notify::{AppStateObserver, NotificationPresenter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Fallback notification title when the connect request did not set one
pub const DEFAULT_NOTIFICATION_TITLE: &str = "New message";

/// One message received on the inbound subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Routes inbound messages to the subscriber or the notification presenter
///
/// The sender is replaceable at runtime; setting a new one takes effect for
/// the next delivered message. With no sender registered, foreground
/// messages are dropped with a warning.
pub struct InboundRouter {
    sender: Option<mpsc::Sender<InboundMessage>>,
    presenter: Arc<dyn NotificationPresenter>,
    app_state: Arc<dyn AppStateObserver>,
}

impl InboundRouter {
    pub fn new(
        presenter: Arc<dyn NotificationPresenter>,
        app_state: Arc<dyn AppStateObserver>,
    ) -> Self {
        Self {
            sender: None,
            presenter,
            app_state,
        }
    }

    /// Replace the message subscriber; `None` unregisters it
    pub fn set_sender(&mut self, sender: Option<mpsc::Sender<InboundMessage>>) {
        self.sender = sender;
    }

    pub async fn deliver(&self, topic: String, payload: Vec<u8>, notification_title: &str) {
        if self.app_state.is_backgrounded() {
            let body = extract_title(&payload)
                .unwrap_or_else(|| String::from_utf8_lossy(&payload).to_string());
            let title = if notification_title.is_empty() {
                DEFAULT_NOTIFICATION_TITLE
            } else {
                notification_title
            };
            debug!(%topic, "app backgrounded, presenting inbound message as notification");
            self.presenter.show(title, &body, None, None);
            return;
        }

        match &self.sender {
            Some(sender) => {
                if sender.send(InboundMessage { topic, payload }).await.is_err() {
                    warn!("message subscriber closed its channel, dropping inbound message");
                }
            }
            None => {
                warn!(%topic, "no message subscriber registered, dropping inbound message");
            }
        }
    }
}

/// Pull the `title` field out of a JSON payload
fn extract_title(payload: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(payload).ok()?;
    value.get("title")?.as_str().map(ToString::to_string)
}
