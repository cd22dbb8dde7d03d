pub mod ads;
pub mod config;
pub mod error;
pub mod playback;
pub mod sqlite;

pub use ads::{
    compute_ad_breaks, AdBreakPlanner, AdBreakPolicy, AdBreakSchedule, AdTagCatalog,
    BackfillFailure, BackfillPolicy, BackfillReport, BreakCursor, ContentAdConfig,
    ContentCategory, ContentMetrics, ContentRecord, ContentStore, DurationClass, PlannedUpdate,
    ScheduleError, SqliteContentStore, SqliteContentStoreBuilder, StoreError, StoreResult,
    WriteMode,
};
pub use config::{
    load_vyb_config, AdsSection, BackfillSection, PathsSection, PlayerSection, SystemSection,
    VybConfig, DEFAULT_AD_TAG_URL,
};
pub use error::{ConfigError, Result};
pub use playback::{
    event_channel, AdEvent, AdRequest, AdSubsystem, EventSender, GuardTimer, MediaElement,
    NullObserver, PlayAttempt, PlayOutcome, PlaybackDriver, PlaybackError, PlaybackEvent,
    PlaybackObserver, PlaybackSession, PlaybackTarget, SessionConfig, SessionParts, SessionState,
    SessionSummary, SlotDimensions, SlotId, TimerToken, TokioGuardTimer,
};
