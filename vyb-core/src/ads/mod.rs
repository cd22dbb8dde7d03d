pub mod error;
pub mod models;
pub mod planner;
pub mod store;

pub use error::{ScheduleError, StoreError, StoreResult};
pub use models::{
    AdBreakSchedule, BackfillFailure, BackfillReport, BreakCursor, ContentAdConfig,
    ContentCategory, ContentMetrics, ContentRecord, DurationClass, PlannedUpdate, WriteMode,
};
pub use planner::{
    compute_ad_breaks, AdBreakPlanner, AdBreakPolicy, AdTagCatalog, BackfillPolicy,
};
pub use store::{ContentStore, SqliteContentStore, SqliteContentStoreBuilder};
