//! Host notification and app-state seams
//!
//! Inbound messages that arrive while the hosting application is
//! backgrounded are rendered as a notification instead of being forwarded
//! to the message subscriber. Both the presenter and the backgrounded
//! oracle are supplied by the host.

/// Fire-and-forget notification renderer
///
/// `icon_ref` and `open_target` are host-defined references (an icon
/// resource and the surface to open on tap); implementations fall back to
/// their own defaults when `None`.
pub trait NotificationPresenter: Send + Sync {
    fn show(&self, title: &str, body: &str, icon_ref: Option<&str>, open_target: Option<&str>);
}

/// Reports whether the hosting application is currently backgrounded
pub trait AppStateObserver: Send + Sync {
    fn is_backgrounded(&self) -> bool;
}

/// App-state observer for headless hosts; never backgrounded, so inbound
/// messages are always forwarded rather than rendered as notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysForeground;

impl AppStateObserver for AlwaysForeground {
    fn is_backgrounded(&self) -> bool {
        false
    }
}
