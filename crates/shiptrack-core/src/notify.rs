//! Delivery of user-visible notices.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::models::{Notice, NoticeLevel};

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log. Useful for headless embedders.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => info!(message = %notice.message, "Notice"),
            NoticeLevel::Error => warn!(message = %notice.message, "Notice"),
        }
    }
}

/// Forwards notices to a channel drained by the UI.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notice>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notice: Notice) {
        if let Err(e) = self.tx.send(notice) {
            debug!(message = %e.0.message, "Notice dropped - receiver closed");
        }
    }
}
