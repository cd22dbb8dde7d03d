use std::time::Duration;

use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;
use tracing::debug;

use super::driver::EventSender;
use super::events::{PlaybackEvent, TimerToken};
use super::GuardTimer;

/// Guard timer backed by a tokio sleep task. Holds only a weak handle on the
/// event channel so a pending guard never keeps a finished driver alive.
#[derive(Debug)]
pub struct TokioGuardTimer {
    events: WeakUnboundedSender<PlaybackEvent>,
    pending: Option<(TimerToken, JoinHandle<()>)>,
}

impl TokioGuardTimer {
    /// Must be called from within a tokio runtime.
    pub fn new(events: &EventSender) -> Self {
        Self {
            events: events.downgrade(),
            pending: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .map(|(_, task)| !task.is_finished())
            .unwrap_or(false)
    }

    fn abort_pending(&mut self) {
        if let Some((token, task)) = self.pending.take() {
            debug!(target: "playback.timer", %token, "aborting guard task");
            task.abort();
        }
    }
}

impl GuardTimer for TokioGuardTimer {
    fn arm(&mut self, token: TimerToken, after: Duration) {
        self.abort_pending();
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(sender) = events.upgrade() {
                if sender.send(PlaybackEvent::GuardExpired(token)).is_err() {
                    debug!(target: "playback.timer", %token, "guard fired after driver stopped");
                }
            }
        });
        debug!(target: "playback.timer", %token, after_ms = after.as_millis() as u64, "guard armed");
        self.pending = Some((token, task));
    }

    fn cancel(&mut self, token: TimerToken) {
        if matches!(self.pending, Some((armed, _)) if armed == token) {
            self.abort_pending();
        }
    }
}

impl Drop for TokioGuardTimer {
    fn drop(&mut self) {
        self.abort_pending();
    }
}
