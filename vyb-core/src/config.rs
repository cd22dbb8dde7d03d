use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ConfigError, Result};

pub const DEFAULT_AD_TAG_URL: &str = "https://pubads.g.doubleclick.net/gampad/ads?iu=/21775744923/external/single_ad_samples&sz=640x480&cust_params=sample_ct%3Dlinear&ciu_szs=300x250%2C728x90&gdfp_req=1&output=vast&unviewed_position_start=1&env=vp&impl=s&correlator=";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VybConfig {
    pub system: SystemSection,
    pub paths: PathsSection,
    #[serde(default)]
    pub ads: AdsSection,
    #[serde(default)]
    pub backfill: BackfillSection,
    #[serde(default)]
    pub player: PlayerSection,
}

impl VybConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.data_dir).join(path)
        }
    }

    pub fn content_db_path(&self) -> PathBuf {
        match &self.paths.content_db {
            Some(path) => self.resolve_path(path),
            None => self.resolve_path("content.sqlite"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemSection {
    pub node_name: String,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    pub data_dir: String,
    #[serde(default)]
    pub content_db: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdsSection {
    pub break_interval_seconds: u32,
    pub short_form_threshold_seconds: u32,
    pub tail_guard_seconds: u32,
    pub default_tag_url: String,
    /// Keyed by category slug (`movie`, `tv_show`, `story`, ...).
    pub tags: BTreeMap<String, String>,
}

impl Default for AdsSection {
    fn default() -> Self {
        Self {
            break_interval_seconds: 720,
            short_form_threshold_seconds: 180,
            tail_guard_seconds: 60,
            default_tag_url: DEFAULT_AD_TAG_URL.to_string(),
            tags: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackfillSection {
    pub short_form_estimate_seconds: i64,
    pub long_form_estimate_seconds: i64,
    pub short_form_categories: Vec<String>,
}

impl Default for BackfillSection {
    fn default() -> Self {
        Self {
            short_form_estimate_seconds: 120,
            long_form_estimate_seconds: 1800,
            short_form_categories: vec!["story".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlayerSection {
    /// Deployment toggle for ad insertion. Off unless a deployment opts in.
    pub ads_enabled: bool,
    pub guard_timeout_ms: u64,
    pub slot_width: u32,
    pub slot_height: u32,
    pub midrolls_enabled: bool,
}

impl PlayerSection {
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_millis(self.guard_timeout_ms)
    }
}

impl Default for PlayerSection {
    fn default() -> Self {
        Self {
            ads_enabled: false,
            guard_timeout_ms: 3000,
            slot_width: 640,
            slot_height: 360,
            midrolls_enabled: false,
        }
    }
}

pub fn load_vyb_config<P: AsRef<Path>>(path: P) -> Result<VybConfig> {
    load_toml(path)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
