use std::collections::HashMap;

use tracing::{debug, info, warn};
use url::Url;

use crate::config::{AdsSection, BackfillSection, VybConfig, DEFAULT_AD_TAG_URL};
use crate::error::ConfigError;

use super::models::{
    AdBreakSchedule, BackfillFailure, BackfillReport, ContentAdConfig, ContentCategory,
    ContentRecord, DurationClass, PlannedUpdate, WriteMode,
};
use super::store::ContentStore;
use super::{StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdBreakPolicy {
    pub break_interval_seconds: u32,
    pub short_form_threshold_seconds: u32,
    pub tail_guard_seconds: u32,
}

impl Default for AdBreakPolicy {
    fn default() -> Self {
        Self {
            break_interval_seconds: 720,
            short_form_threshold_seconds: 180,
            tail_guard_seconds: 60,
        }
    }
}

impl AdBreakPolicy {
    pub fn from_section(section: &AdsSection) -> Self {
        Self {
            break_interval_seconds: section.break_interval_seconds.max(1),
            short_form_threshold_seconds: section.short_form_threshold_seconds,
            tail_guard_seconds: section.tail_guard_seconds,
        }
    }

    /// `category` does not change placement today; it is accepted so a
    /// per-category policy can be introduced without touching callers.
    pub fn compute(&self, category: &ContentCategory, duration_seconds: f64) -> AdBreakSchedule {
        let duration = sanitize_duration(duration_seconds);
        if duration != duration_seconds {
            debug!(
                target: "planner",
                %category,
                raw = duration_seconds,
                "degenerate duration clamped to 0"
            );
        }

        if DurationClass::of(duration, self.short_form_threshold_seconds) == DurationClass::Short {
            return AdBreakSchedule::pre_roll_only();
        }

        let limit = duration - f64::from(self.tail_guard_seconds);
        let interval = u64::from(self.break_interval_seconds.max(1));
        let mut midrolls = Vec::new();
        let mut offset = interval;
        while (offset as f64) < limit && offset <= u64::from(u32::MAX) {
            midrolls.push(offset as u32);
            offset += interval;
        }
        AdBreakSchedule::with_midrolls(midrolls)
    }
}

/// Schedule under the default policy: pre-roll at `0`, then a mid-roll every
/// 720 s for content of at least 180 s, none within the last 60 s.
pub fn compute_ad_breaks(category: &ContentCategory, duration_seconds: f64) -> AdBreakSchedule {
    AdBreakPolicy::default().compute(category, duration_seconds)
}

fn sanitize_duration(duration_seconds: f64) -> f64 {
    if duration_seconds.is_finite() && duration_seconds > 0.0 {
        duration_seconds
    } else {
        0.0
    }
}

#[derive(Debug, Clone)]
pub struct AdTagCatalog {
    default_tag: String,
    by_category: HashMap<ContentCategory, String>,
}

impl Default for AdTagCatalog {
    fn default() -> Self {
        Self {
            default_tag: DEFAULT_AD_TAG_URL.to_string(),
            by_category: HashMap::new(),
        }
    }
}

impl AdTagCatalog {
    pub fn from_section(section: &AdsSection) -> Result<Self, ConfigError> {
        let default_tag = validate_tag("default", &section.default_tag_url)?;
        let mut by_category = HashMap::new();
        for (key, tag) in &section.tags {
            let tag = validate_tag(key, tag)?;
            by_category.insert(ContentCategory::parse(key), tag);
        }
        Ok(Self {
            default_tag,
            by_category,
        })
    }

    pub fn with_tag(mut self, category: ContentCategory, tag: impl Into<String>) -> Self {
        self.by_category.insert(category, tag.into());
        self
    }

    pub fn resolve(&self, category: &ContentCategory) -> &str {
        self.by_category
            .get(category)
            .map(String::as_str)
            .unwrap_or(&self.default_tag)
    }

}

fn validate_tag(category: &str, tag: &str) -> Result<String, ConfigError> {
    Url::parse(tag.trim())
        .map(|_| tag.trim().to_string())
        .map_err(|source| ConfigError::InvalidAdTag {
            category: category.to_string(),
            source,
        })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackfillPolicy {
    pub short_form_estimate_seconds: i64,
    pub long_form_estimate_seconds: i64,
    pub short_form_categories: Vec<ContentCategory>,
}

impl Default for BackfillPolicy {
    fn default() -> Self {
        Self {
            short_form_estimate_seconds: 120,
            long_form_estimate_seconds: 1800,
            short_form_categories: vec![ContentCategory::Story],
        }
    }
}

impl BackfillPolicy {
    pub fn from_section(section: &BackfillSection) -> Self {
        Self {
            short_form_estimate_seconds: section.short_form_estimate_seconds.max(0),
            long_form_estimate_seconds: section.long_form_estimate_seconds.max(0),
            short_form_categories: section
                .short_form_categories
                .iter()
                .map(|raw| ContentCategory::parse(raw))
                .collect(),
        }
    }

    /// Coarse placeholder until transcoding reports the real duration.
    pub fn estimate_duration(&self, category: &ContentCategory) -> i64 {
        if self.short_form_categories.contains(category) {
            self.short_form_estimate_seconds
        } else {
            self.long_form_estimate_seconds
        }
    }
}

/// Single entry point for ad placement, shared by the backfill, the explicit
/// re-save path and the player.
#[derive(Debug, Clone, Default)]
pub struct AdBreakPlanner {
    policy: AdBreakPolicy,
    tags: AdTagCatalog,
    backfill: BackfillPolicy,
}

impl AdBreakPlanner {
    pub fn new(policy: AdBreakPolicy, tags: AdTagCatalog, backfill: BackfillPolicy) -> Self {
        Self {
            policy,
            tags,
            backfill,
        }
    }

    pub fn from_config(config: &VybConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(
            AdBreakPolicy::from_section(&config.ads),
            AdTagCatalog::from_section(&config.ads)?,
            BackfillPolicy::from_section(&config.backfill),
        ))
    }

    pub fn compute_ad_breaks(
        &self,
        category: &ContentCategory,
        duration_seconds: f64,
    ) -> AdBreakSchedule {
        self.policy.compute(category, duration_seconds)
    }

    pub fn resolve_ad_tag(&self, category: &ContentCategory) -> &str {
        self.tags.resolve(category)
    }

    /// Full configuration for a known duration, replacing whatever was there.
    pub fn configure(&self, category: &ContentCategory, duration_seconds: i64) -> ContentAdConfig {
        let duration = duration_seconds.max(0);
        ContentAdConfig {
            duration_seconds: Some(duration),
            ad_breaks: Some(self.compute_ad_breaks(category, duration as f64)),
            vast_tag_url: Some(self.resolve_ad_tag(category).to_string()),
            monetization_enabled: true,
        }
    }

    /// Fills only the missing ad fields of `record`. Returns `None` when the
    /// record is already configured.
    pub fn plan_gaps(&self, record: &ContentRecord) -> Option<PlannedUpdate> {
        let current = &record.ad_config;
        if current.is_configured() {
            return None;
        }
        let category = record.category();
        let known = current.duration_seconds.filter(|duration| *duration >= 0);
        let duration = known.unwrap_or_else(|| self.backfill.estimate_duration(&category));
        let ad_breaks = current
            .ad_breaks
            .clone()
            .unwrap_or_else(|| self.compute_ad_breaks(&category, duration as f64));
        let vast_tag_url = current
            .vast_tag_url
            .clone()
            .filter(|tag| !tag.trim().is_empty())
            .unwrap_or_else(|| self.resolve_ad_tag(&category).to_string());

        Some(PlannedUpdate {
            content_id: record.id.clone(),
            category,
            duration_estimated: known.is_none(),
            mode: if record.ad_breaks_rejected {
                WriteMode::RepairAdBreaks
            } else {
                WriteMode::FillGaps
            },
            config: ContentAdConfig {
                duration_seconds: Some(duration),
                ad_breaks: Some(ad_breaks),
                vast_tag_url: Some(vast_tag_url),
                monetization_enabled: true,
            },
        })
    }

    pub fn preview_backfill<S>(&self, store: &S) -> StoreResult<Vec<PlannedUpdate>>
    where
        S: ContentStore + ?Sized,
    {
        let records = store.fetch_unconfigured()?;
        Ok(records
            .iter()
            .filter_map(|record| self.plan_gaps(record))
            .collect())
    }

    /// Assigns defaults to every row missing ad configuration. A failed row
    /// write is counted and the batch moves on; only a failed scan aborts.
    pub fn backfill_monetization<S>(&self, store: &S) -> StoreResult<BackfillReport>
    where
        S: ContentStore + ?Sized,
    {
        let records = store.fetch_unconfigured()?;
        let mut report = BackfillReport {
            scanned: records.len(),
            ..BackfillReport::default()
        };
        info!(
            target: "planner.backfill",
            scanned = report.scanned,
            "backfilling ad configuration"
        );

        for record in &records {
            let Some(update) = self.plan_gaps(record) else {
                continue;
            };
            match store.apply_ad_config(&update.content_id, &update.config, update.mode) {
                Ok(()) => {
                    debug!(
                        target: "planner.backfill",
                        content_id = %update.content_id,
                        category = %update.category,
                        estimated = update.duration_estimated,
                        mode = ?update.mode,
                        "ad configuration assigned"
                    );
                    report.updated_count += 1;
                }
                Err(err) => {
                    warn!(
                        target: "planner.backfill",
                        content_id = %update.content_id,
                        "failed to persist ad configuration: {err}"
                    );
                    report.failed_count += 1;
                    report.failures.push(BackfillFailure {
                        content_id: update.content_id.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            target: "planner.backfill",
            updated = report.updated_count,
            failed = report.failed_count,
            "backfill finished"
        );
        Ok(report)
    }

    /// Explicit re-save once the real duration is known. Unlike the backfill
    /// this overwrites existing ad fields.
    pub fn configure_content<S>(
        &self,
        store: &S,
        content_id: &str,
        duration_seconds: i64,
    ) -> StoreResult<ContentAdConfig>
    where
        S: ContentStore + ?Sized,
    {
        let record = store
            .fetch_by_id(content_id)?
            .ok_or_else(|| StoreError::NotFound {
                content_id: content_id.to_string(),
            })?;
        let config = self.configure(&record.category(), duration_seconds);
        store.apply_ad_config(content_id, &config, WriteMode::Overwrite)?;
        info!(
            target: "planner",
            content_id,
            duration = duration_seconds,
            breaks = %config.ad_breaks.as_ref().map(ToString::to_string).unwrap_or_default(),
            "ad configuration saved"
        );
        Ok(config)
    }
}
