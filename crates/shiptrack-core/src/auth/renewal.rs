//! Silent renewal of the access token.
//!
//! While a refresh token is held, a background task ticks every
//! `refresh_interval` and exchanges it for a new access token. The task is
//! owned through a `RenewalHandle`; dropping the handle aborts the task, so
//! replacing or clearing the handle is all logout needs to do.

use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::debug;

/// Result of a single renewal attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalOutcome {
    /// A new access token was stored
    Renewed,
    /// No refresh token is stored. A session still held in memory was ended
    NoSession,
    /// The session ended or changed while the request was in flight
    Discarded,
    /// A transient failure; the session is kept for another attempt
    Failed { consecutive: u32 },
    /// The refresh token is no longer accepted; the session was ended
    Expired,
}

impl RenewalOutcome {
    /// Whether the loop should keep ticking after this outcome
    pub fn keeps_running(self) -> bool {
        matches!(
            self,
            RenewalOutcome::Renewed | RenewalOutcome::Failed { .. } | RenewalOutcome::Discarded
        )
    }
}

/// Owns the renewal task. Aborts it on drop.
#[derive(Debug)]
pub(crate) struct RenewalHandle {
    task: JoinHandle<()>,
}

impl RenewalHandle {
    /// Spawn the loop. `attempt` is called on every tick and returns `None`
    /// once the session it renews no longer exists.
    pub(crate) fn spawn<F, Fut>(runtime: &Handle, period: Duration, mut attempt: F) -> Self
    where
        F: FnMut() -> Option<Fut> + Send + 'static,
        Fut: Future<Output = RenewalOutcome> + Send + 'static,
    {
        let task = runtime.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                let Some(renewal) = attempt() else {
                    debug!("Session dropped, stopping renewal");
                    break;
                };
                let outcome = renewal.await;
                debug!(?outcome, "Renewal tick finished");
                if !outcome.keeps_running() {
                    break;
                }
            }
        });
        Self { task }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for RenewalHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
