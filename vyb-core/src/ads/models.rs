use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rusqlite::types::{ToSql, ToSqlOutput};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ScheduleError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentCategory {
    Movie,
    TvShow,
    MusicVideo,
    Story,
    Talent,
    Challenge,
    Live,
    Other(String),
}

impl ContentCategory {
    /// Accepts slugs (`tv_show`) as well as the labels the upload flow stores
    /// (`TV Show`, `Short Story`, `Music Videos`).
    pub fn parse(raw: &str) -> Self {
        let normalized = raw
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        match normalized.as_str() {
            "movie" | "movies" | "film" | "films" => ContentCategory::Movie,
            "tv_show" | "tv_shows" | "tv" | "show" | "shows" | "series" => ContentCategory::TvShow,
            "music_video" | "music_videos" | "music" => ContentCategory::MusicVideo,
            "story" | "stories" | "short_story" | "short_stories" | "short" | "shorts" => {
                ContentCategory::Story
            }
            "talent" | "talents" => ContentCategory::Talent,
            "challenge" | "challenges" => ContentCategory::Challenge,
            "live" | "live_stream" | "livestream" => ContentCategory::Live,
            _ => ContentCategory::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentCategory::Movie => "movie",
            ContentCategory::TvShow => "tv_show",
            ContentCategory::MusicVideo => "music_video",
            ContentCategory::Story => "story",
            ContentCategory::Talent => "talent",
            ContentCategory::Challenge => "challenge",
            ContentCategory::Live => "live",
            ContentCategory::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ContentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ContentCategory {
    fn from(value: &str) -> Self {
        ContentCategory::parse(value)
    }
}

impl From<String> for ContentCategory {
    fn from(value: String) -> Self {
        ContentCategory::parse(&value)
    }
}

impl From<ContentCategory> for String {
    fn from(value: ContentCategory) -> Self {
        value.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationClass {
    Short,
    Long,
}

impl DurationClass {
    pub fn of(duration_seconds: f64, short_form_threshold_seconds: u32) -> Self {
        if duration_seconds < f64::from(short_form_threshold_seconds) {
            DurationClass::Short
        } else {
            DurationClass::Long
        }
    }
}

/// Ad break offsets in seconds. Always starts with the pre-roll at `0` and is
/// strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u32>", into = "Vec<u32>")]
pub struct AdBreakSchedule(Vec<u32>);

impl AdBreakSchedule {
    pub fn pre_roll_only() -> Self {
        Self(vec![0])
    }

    pub(crate) fn with_midrolls(midrolls: Vec<u32>) -> Self {
        let mut offsets = Vec::with_capacity(midrolls.len() + 1);
        offsets.push(0);
        offsets.extend(midrolls);
        Self(offsets)
    }

    pub fn offsets(&self) -> &[u32] {
        &self.0
    }

    pub fn midrolls(&self) -> &[u32] {
        &self.0[1..]
    }

    /// Decodes the JSON text stored in the `ad_breaks` column.
    pub fn from_stored(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

impl TryFrom<Vec<u32>> for AdBreakSchedule {
    type Error = ScheduleError;

    fn try_from(offsets: Vec<u32>) -> Result<Self, Self::Error> {
        match offsets.first() {
            None => return Err(ScheduleError::Empty),
            Some(&first) if first != 0 => return Err(ScheduleError::MissingPreRoll(first)),
            Some(_) => {}
        }
        for pair in offsets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ScheduleError::NotIncreasing {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(Self(offsets))
    }
}

impl From<AdBreakSchedule> for Vec<u32> {
    fn from(value: AdBreakSchedule) -> Self {
        value.0
    }
}

impl fmt::Display for AdBreakSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.0.iter().map(|offset| format!("{offset}s")).collect();
        write!(f, "[{}]", labels.join(", "))
    }
}

impl ToSql for AdBreakSchedule {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let json = serde_json::to_string(&self.0)
            .map_err(|err| rusqlite::Error::ToSqlConversionFailure(Box::new(err)))?;
        Ok(ToSqlOutput::from(json))
    }
}

/// Tracks which mid-roll offsets have already been played in a session.
#[derive(Debug, Clone)]
pub struct BreakCursor {
    offsets: Vec<u32>,
    next: usize,
}

impl BreakCursor {
    pub fn new(schedule: &AdBreakSchedule) -> Self {
        Self {
            offsets: schedule.midrolls().to_vec(),
            next: 0,
        }
    }

    /// Consumes every offset the playhead has crossed and returns the latest
    /// one, so a seek across several breaks yields a single slot.
    pub fn advance(&mut self, position_seconds: f64) -> Option<u32> {
        if !position_seconds.is_finite() {
            return None;
        }
        let mut due = None;
        while let Some(&offset) = self.offsets.get(self.next) {
            if f64::from(offset) > position_seconds {
                break;
            }
            due = Some(offset);
            self.next += 1;
        }
        due
    }

    pub fn remaining(&self) -> &[u32] {
        &self.offsets[self.next..]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContentAdConfig {
    pub duration_seconds: Option<i64>,
    pub ad_breaks: Option<AdBreakSchedule>,
    pub vast_tag_url: Option<String>,
    pub monetization_enabled: bool,
}

impl ContentAdConfig {
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.duration_seconds.is_none() {
            missing.push("duration_seconds");
        }
        if self.ad_breaks.is_none() {
            missing.push("ad_breaks");
        }
        if self
            .vast_tag_url
            .as_deref()
            .map(|tag| tag.trim().is_empty())
            .unwrap_or(true)
        {
            missing.push("vast_tag_url");
        }
        missing
    }

    /// The tag the player should request, if this content carries ads at all.
    pub fn ad_tag(&self) -> Option<&str> {
        if !self.monetization_enabled {
            return None;
        }
        self.vast_tag_url
            .as_deref()
            .filter(|tag| !tag.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub content_type: String,
    pub title: Option<String>,
    pub ad_config: ContentAdConfig,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Set when the stored `ad_breaks` text could not be decoded. The
    /// schedule then reads as missing so the backfill can replace it.
    #[serde(skip)]
    pub ad_breaks_rejected: bool,
}

impl ContentRecord {
    pub fn new(id: impl Into<String>, content_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content_type: content_type.into(),
            title: None,
            ad_config: ContentAdConfig::default(),
            created_at: None,
            updated_at: None,
            ad_breaks_rejected: false,
        }
    }

    pub fn category(&self) -> ContentCategory {
        ContentCategory::parse(&self.content_type)
    }

    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let created_at: Option<NaiveDateTime> = row.get("created_at")?;
        let updated_at: Option<NaiveDateTime> = row.get("updated_at")?;
        let id: String = row.get("id")?;
        let raw_breaks: Option<String> = row.get("ad_breaks")?;
        let mut ad_breaks_rejected = false;
        let ad_breaks = raw_breaks.and_then(|raw| match AdBreakSchedule::from_stored(&raw) {
            Ok(schedule) => Some(schedule),
            Err(err) => {
                warn!(
                    target: "content_store",
                    content_id = %id,
                    stored = %raw,
                    "ignoring undecodable ad_breaks: {err}"
                );
                ad_breaks_rejected = true;
                None
            }
        });
        Ok(Self {
            id,
            content_type: row.get("content_type")?,
            title: row.get("title")?,
            ad_config: ContentAdConfig {
                duration_seconds: row.get("duration_seconds")?,
                ad_breaks,
                vast_tag_url: row.get("vast_tag_url")?,
                monetization_enabled: row
                    .get::<_, Option<i64>>("monetization_enabled")?
                    .map(|value| value != 0)
                    .unwrap_or(false),
            },
            created_at: created_at.map(|dt| Utc.from_utc_datetime(&dt)),
            updated_at: updated_at.map(|dt| Utc.from_utc_datetime(&dt)),
            ad_breaks_rejected,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Only columns that are still `NULL` are written.
    FillGaps,
    /// As `FillGaps`, but an undecodable `ad_breaks` value is replaced.
    RepairAdBreaks,
    Overwrite,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ContentMetrics {
    pub total: usize,
    pub configured: usize,
    pub monetized: usize,
    pub by_type: HashMap<String, usize>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PlannedUpdate {
    pub content_id: String,
    pub category: ContentCategory,
    pub duration_estimated: bool,
    pub mode: WriteMode,
    pub config: ContentAdConfig,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackfillFailure {
    pub content_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub scanned: usize,
    pub updated_count: usize,
    pub failed_count: usize,
    pub failures: Vec<BackfillFailure>,
}
