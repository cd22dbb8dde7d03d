use std::time::Duration;

use thiserror::Error;

/// Everything the orchestrator reports through `on_error`. Only
/// `ContentPlayback` ends a session; ad failures always fall back to content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("ad subsystem failed to load: {0}")]
    AdLoad(String),
    #[error("ad request failed: {0}")]
    AdRequest(String),
    #[error("ad playback failed: {0}")]
    AdPlayback(String),
    #[error("ad not ready after {0:?}")]
    AdTimeout(Duration),
    #[error("autoplay rejected, waiting for a play gesture")]
    AutoplayBlocked,
    #[error("content playback failed: {0}")]
    ContentPlayback(String),
}

impl PlaybackError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlaybackError::ContentPlayback(_))
    }
}
