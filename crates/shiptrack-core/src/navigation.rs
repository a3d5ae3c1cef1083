//! Navigation seam between the session and the surface displaying it.
//!
//! The session never renders anything itself. When it needs the user on a
//! different surface (the landing page after login, the login page after
//! logout or an unauthorized response) it performs a full navigation through
//! a `Navigator`, and every part of the front end is expected to reinitialize
//! from the durable token store.

use tokio::sync::watch;
use tracing::info;

pub trait Navigator: Send + Sync {
    /// Path of the surface currently shown
    fn current_path(&self) -> String;

    /// Perform a full navigation to `path`
    fn navigate(&self, path: &str);
}

/// A `Navigator` that tracks the current path and broadcasts every
/// navigation to subscribers.
///
/// A navigation is broadcast even when the target equals the current path,
/// matching a hard reload.
pub struct RouteTracker {
    tx: watch::Sender<String>,
}

impl RouteTracker {
    pub fn new(initial: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(initial.into());
        Self { tx }
    }

    /// Receive every future navigation
    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Navigator for RouteTracker {
    fn current_path(&self) -> String {
        self.tx.borrow().clone()
    }

    fn navigate(&self, path: &str) {
        info!(path, "Navigating");
        self.tx.send_replace(path.to_string());
    }
}
