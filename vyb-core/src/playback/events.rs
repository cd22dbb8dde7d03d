use std::fmt;

use serde::Serialize;

/// Identifies one arming of the guard timer. An expiry carrying any other
/// token is stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimerToken(pub(crate) u64);

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "guard-{}", self.0)
    }
}

/// Numbers the ad slots a session opens, starting at 1. Ad SDK answers echo
/// the slot they were requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SlotId(pub(crate) u32);

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayAttempt {
    Unmuted,
    Muted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    Started,
    Rejected(String),
}

/// Lifecycle signals emitted by the ad SDK once a creative is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdEvent {
    Started,
    ContentPauseRequested,
    ContentResumeRequested,
    Complete,
    Skipped,
    AllAdsCompleted,
    Error(String),
}

impl AdEvent {
    pub fn resumes_content(&self) -> bool {
        matches!(
            self,
            AdEvent::Complete
                | AdEvent::Skipped
                | AdEvent::AllAdsCompleted
                | AdEvent::ContentResumeRequested
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Viewer pressed play.
    Play,
    /// Viewer paused content.
    Pause,
    AdReady(SlotId),
    AdRequestFailed(SlotId, String),
    /// The ad SDK itself could not be loaded (script or network failure).
    AdLoadFailed(String),
    Ad(AdEvent),
    GuardExpired(TimerToken),
    PlayResolved {
        attempt: PlayAttempt,
        outcome: PlayOutcome,
    },
    TimeUpdate {
        position_seconds: f64,
    },
    MediaError(String),
    ContentEnded,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotDimensions {
    pub width: u32,
    pub height: u32,
}

impl Default for SlotDimensions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdRequest {
    pub slot_id: SlotId,
    pub tag_url: String,
    pub slot: SlotDimensions,
    pub offset_seconds: u32,
}
