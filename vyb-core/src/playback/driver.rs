use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info};

use super::events::PlaybackEvent;
use super::session::{PlaybackSession, SessionSummary};

/// Cloneable handle that adapters use to post events into a session.
#[derive(Debug, Clone)]
pub struct EventSender {
    inner: UnboundedSender<PlaybackEvent>,
}

impl EventSender {
    /// Returns `false` once the driver has stopped.
    pub fn send(&self, event: PlaybackEvent) -> bool {
        self.inner.send(event).is_ok()
    }

    pub(crate) fn downgrade(&self) -> WeakUnboundedSender<PlaybackEvent> {
        self.inner.downgrade()
    }
}

pub fn event_channel() -> (EventSender, UnboundedReceiver<PlaybackEvent>) {
    let (inner, receiver) = mpsc::unbounded_channel();
    (EventSender { inner }, receiver)
}

/// Feeds events to a session one at a time until it finishes, is closed, or
/// every sender is gone.
#[derive(Debug)]
pub struct PlaybackDriver {
    session: PlaybackSession,
    events: UnboundedReceiver<PlaybackEvent>,
}

impl PlaybackDriver {
    pub fn new(session: PlaybackSession, events: UnboundedReceiver<PlaybackEvent>) -> Self {
        Self { session, events }
    }

    pub async fn run(mut self) -> SessionSummary {
        info!(target: "playback", session = %self.session.id(), "driver started");
        while let Some(event) = self.events.recv().await {
            self.session.handle(event);
            if self.session.is_finished() {
                break;
            }
        }
        debug!(target: "playback", session = %self.session.id(), state = ?self.session.state(), "event loop finished");
        self.events.close();
        let summary = self.session.summary();
        self.session.close();
        info!(
            target: "playback",
            session = %summary.session_id,
            final_state = ?summary.final_state,
            "driver stopped"
        );
        summary
    }
}
