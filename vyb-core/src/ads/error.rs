use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("content {content_id} not found")]
    NotFound { content_id: String },
    #[error("content store path not configured")]
    MissingStore,
    #[error("failed to open database at {path}: {source}")]
    OpenDatabase {
        path: PathBuf,
        source: rusqlite::Error,
    },
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("ad break schedule is empty")]
    Empty,
    #[error("ad break schedule must start at 0, found {0}")]
    MissingPreRoll(u32),
    #[error("ad break offsets must be strictly increasing ({previous} then {next})")]
    NotIncreasing { previous: u32, next: u32 },
}
