pub mod driver;
pub mod error;
pub mod events;
pub mod session;
pub mod timer;

use std::time::Duration;

pub use driver::{event_channel, EventSender, PlaybackDriver};
pub use error::PlaybackError;
pub use events::{
    AdEvent, AdRequest, PlayAttempt, PlayOutcome, PlaybackEvent, SlotDimensions, SlotId,
    TimerToken,
};
pub use session::{
    PlaybackSession, PlaybackTarget, SessionConfig, SessionParts, SessionState, SessionSummary,
};
pub use timer::TokioGuardTimer;

/// Ad SDK boundary. Completion is reported back as `PlaybackEvent`s; none of
/// these calls block.
pub trait AdSubsystem: Send {
    fn request_ad(&mut self, request: &AdRequest);
    fn start(&mut self);
    fn set_visible(&mut self, visible: bool);
    /// Releases the loaded creative. Safe to call more than once.
    fn destroy(&mut self);
}

/// The content media surface. `play` resolves later through
/// `PlaybackEvent::PlayResolved` with the same attempt.
pub trait MediaElement: Send {
    fn play(&mut self, attempt: PlayAttempt);
    fn pause(&mut self);
    fn set_muted(&mut self, muted: bool);
    fn set_visible(&mut self, visible: bool);
}

pub trait PlaybackObserver: Send {
    fn on_ad_start(&mut self) {}
    fn on_ad_complete(&mut self) {}
    fn on_content_start(&mut self) {}
    fn on_content_pause(&mut self) {}
    fn on_error(&mut self, _error: &PlaybackError) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl PlaybackObserver for NullObserver {}

/// One-shot timer keyed by token. Expiry is delivered as
/// `PlaybackEvent::GuardExpired`.
pub trait GuardTimer: Send {
    fn arm(&mut self, token: TimerToken, after: Duration);
    fn cancel(&mut self, token: TimerToken);
}
