use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use vyb_core::{
    load_vyb_config, AdBreakPlanner, BackfillReport, ContentCategory, ContentMetrics,
    ContentRecord, ContentStore, PlannedUpdate, SqliteContentStore, VybConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vyb_core::ConfigError),
    #[error("content store error: {0}")]
    Store(#[from] vyb_core::StoreError),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("content {0} already exists")]
    Duplicate(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "VYB Cinema ad planning control interface", long_about = None)]
pub struct Cli {
    /// Path to the main vyb.toml
    #[arg(long, default_value = "configs/vyb.toml")]
    pub config: PathBuf,
    /// Alternative path for content.sqlite
    #[arg(long)]
    pub content_db: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Computes the ad break schedule for a duration
    Breaks(BreaksArgs),
    /// Resolves the ad tag used for a category
    Tag(TagArgs),
    /// Assigns default ad configuration to every unconfigured row
    Backfill(BackfillArgs),
    /// Content catalogue operations
    #[command(subcommand)]
    Content(ContentCommands),
}

#[derive(Args, Debug)]
pub struct BreaksArgs {
    #[arg(long)]
    pub category: String,
    /// Duration in seconds
    #[arg(long)]
    pub duration: f64,
}

#[derive(Args, Debug)]
pub struct TagArgs {
    #[arg(long)]
    pub category: String,
}

#[derive(Args, Debug)]
pub struct BackfillArgs {
    /// Shows what would be written without touching the store
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ContentCommands {
    /// Lists content rows
    List(ContentListArgs),
    /// Registers a new content row without ad configuration
    Add(ContentAddArgs),
    /// Saves ad configuration for a known duration, replacing estimates
    Configure(ContentConfigureArgs),
    /// Shows catalogue metrics
    Stats,
}

#[derive(Args, Debug)]
pub struct ContentListArgs {
    /// Only rows still missing ad configuration
    #[arg(long, default_value_t = false)]
    pub unconfigured: bool,
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ContentAddArgs {
    pub id: String,
    #[arg(long)]
    pub category: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub duration: Option<i64>,
}

#[derive(Args, Debug)]
pub struct ContentConfigureArgs {
    pub id: String,
    #[arg(long)]
    pub duration: i64,
}

pub fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Breaks(args) => render(&context.breaks(args), cli.format)?,
        Commands::Tag(args) => render(&context.tag(args), cli.format)?,
        Commands::Backfill(args) => {
            if args.dry_run {
                render(&context.backfill_preview()?, cli.format)?;
            } else {
                render(&context.backfill()?, cli.format)?;
            }
        }
        Commands::Content(ContentCommands::List(args)) => {
            render(&context.content_list(args)?, cli.format)?
        }
        Commands::Content(ContentCommands::Add(args)) => {
            render(&context.content_add(args)?, cli.format)?
        }
        Commands::Content(ContentCommands::Configure(args)) => {
            render(&context.content_configure(args)?, cli.format)?
        }
        Commands::Content(ContentCommands::Stats) => {
            render(&context.content_stats()?, cli.format)?
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: VybConfig,
    planner: AdBreakPlanner,
    content_db: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_vyb_config(&cli.config)?;
        let planner = AdBreakPlanner::from_config(&config)?;
        let content_db = cli
            .content_db
            .clone()
            .unwrap_or_else(|| config.content_db_path());
        Ok(Self {
            config,
            planner,
            content_db,
        })
    }

    fn store(&self) -> Result<SqliteContentStore> {
        if let Some(parent) = self.content_db.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(AppError::InvalidArgument(format!(
                    "data directory {} does not exist",
                    parent.display()
                )));
            }
        }
        let store = SqliteContentStore::new(&self.content_db)?;
        store.initialize()?;
        Ok(store)
    }

    fn breaks(&self, args: &BreaksArgs) -> BreaksOutput {
        let category = ContentCategory::parse(&args.category);
        let schedule = self.planner.compute_ad_breaks(&category, args.duration);
        BreaksOutput {
            category: category.to_string(),
            duration_seconds: args.duration,
            ad_breaks: schedule.offsets().to_vec(),
        }
    }

    fn tag(&self, args: &TagArgs) -> TagOutput {
        let category = ContentCategory::parse(&args.category);
        TagOutput {
            tag_url: self.planner.resolve_ad_tag(&category).to_string(),
            category: category.to_string(),
        }
    }

    fn backfill(&self) -> Result<BackfillReport> {
        let store = self.store()?;
        Ok(self.planner.backfill_monetization(&store)?)
    }

    fn backfill_preview(&self) -> Result<BackfillPreview> {
        let store = self.store()?;
        Ok(BackfillPreview {
            planned: self.planner.preview_backfill(&store)?,
        })
    }

    fn content_list(&self, args: &ContentListArgs) -> Result<ContentList> {
        let store = self.store()?;
        let rows = store
            .list(args.unconfigured, args.limit)?
            .iter()
            .map(ContentEntry::from)
            .collect();
        Ok(ContentList { rows })
    }

    fn content_add(&self, args: &ContentAddArgs) -> Result<ContentEntry> {
        if args.duration.map(|d| d < 0).unwrap_or(false) {
            return Err(AppError::InvalidArgument(
                "duration must not be negative".to_string(),
            ));
        }
        let store = self.store()?;
        if store.fetch_by_id(&args.id)?.is_some() {
            return Err(AppError::Duplicate(args.id.clone()));
        }
        let mut record = ContentRecord::new(
            args.id.clone(),
            ContentCategory::parse(&args.category).to_string(),
        );
        record.title = args.title.clone();
        record.ad_config.duration_seconds = args.duration;
        store.upsert_content(&record)?;
        self.fetch_entry(&store, &args.id)
    }

    fn content_configure(&self, args: &ContentConfigureArgs) -> Result<ContentEntry> {
        let store = self.store()?;
        self.planner
            .configure_content(&store, &args.id, args.duration)?;
        self.fetch_entry(&store, &args.id)
    }

    fn content_stats(&self) -> Result<ContentStats> {
        let store = self.store()?;
        Ok(ContentStats {
            node_name: self.config.system.node_name.clone(),
            ads_enabled: self.config.player.ads_enabled,
            metrics: store.compute_metrics()?,
        })
    }

    fn fetch_entry(&self, store: &SqliteContentStore, content_id: &str) -> Result<ContentEntry> {
        let record = store
            .fetch_by_id(content_id)?
            .ok_or_else(|| vyb_core::StoreError::NotFound {
                content_id: content_id.to_string(),
            })?;
        Ok(ContentEntry::from(&record))
    }
}

#[derive(Debug, Serialize)]
pub struct BreaksOutput {
    pub category: String,
    pub duration_seconds: f64,
    pub ad_breaks: Vec<u32>,
}

impl DisplayFallback for BreaksOutput {
    fn display(&self) -> String {
        let offsets = self
            .ad_breaks
            .iter()
            .map(|offset| format!("{offset}s"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "{} @ {}s -> [{}]",
            self.category, self.duration_seconds, offsets
        )
    }
}

#[derive(Debug, Serialize)]
pub struct TagOutput {
    pub category: String,
    pub tag_url: String,
}

impl DisplayFallback for TagOutput {
    fn display(&self) -> String {
        format!("{}: {}", self.category, self.tag_url)
    }
}

impl DisplayFallback for BackfillReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "scanned={} updated={} failed={}",
            self.scanned, self.updated_count, self.failed_count
        )];
        for failure in &self.failures {
            lines.push(format!("  ! {}: {}", failure.content_id, failure.reason));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct BackfillPreview {
    pub planned: Vec<PlannedUpdate>,
}

impl DisplayFallback for BackfillPreview {
    fn display(&self) -> String {
        if self.planned.is_empty() {
            return "Nothing to backfill".to_string();
        }
        let mut lines = Vec::new();
        for update in &self.planned {
            let duration = update
                .config
                .duration_seconds
                .map(|v| format!("{v}s"))
                .unwrap_or_else(|| "-".to_string());
            let breaks = update
                .config
                .ad_breaks
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            lines.push(format!(
                "{id} | {category} | dur={duration}{estimated} | breaks={breaks}",
                id = update.content_id,
                category = update.category,
                estimated = if update.duration_estimated { " (est.)" } else { "" },
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ContentList {
    pub rows: Vec<ContentEntry>,
}

#[derive(Debug, Serialize)]
pub struct ContentEntry {
    pub id: String,
    pub content_type: String,
    pub title: Option<String>,
    pub duration_seconds: Option<i64>,
    pub ad_breaks: Option<Vec<u32>>,
    pub vast_tag_url: Option<String>,
    pub monetization_enabled: bool,
    pub updated_at: Option<String>,
}

impl From<&ContentRecord> for ContentEntry {
    fn from(record: &ContentRecord) -> Self {
        Self {
            id: record.id.clone(),
            content_type: record.content_type.clone(),
            title: record.title.clone(),
            duration_seconds: record.ad_config.duration_seconds,
            ad_breaks: record
                .ad_config
                .ad_breaks
                .as_ref()
                .map(|schedule| schedule.offsets().to_vec()),
            vast_tag_url: record.ad_config.vast_tag_url.clone(),
            monetization_enabled: record.ad_config.monetization_enabled,
            updated_at: record.updated_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

impl DisplayFallback for ContentEntry {
    fn display(&self) -> String {
        let duration = self
            .duration_seconds
            .map(|v| format!("{v}s"))
            .unwrap_or_else(|| "-".to_string());
        let breaks = self
            .ad_breaks
            .as_ref()
            .map(|offsets| format!("{offsets:?}"))
            .unwrap_or_else(|| "-".to_string());
        format!(
            "{} | {} | {} | dur={} | breaks={} | ads={}",
            self.id,
            self.title.as_deref().unwrap_or("<untitled>"),
            self.content_type,
            duration,
            breaks,
            if self.monetization_enabled { "on" } else { "off" }
        )
    }
}

impl DisplayFallback for ContentList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "No content found".to_string();
        }
        self.rows
            .iter()
            .map(DisplayFallback::display)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct ContentStats {
    pub node_name: String,
    pub ads_enabled: bool,
    pub metrics: ContentMetrics,
}

impl DisplayFallback for ContentStats {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Node: {}", self.node_name),
            format!(
                "Ads: {}",
                if self.ads_enabled { "enabled" } else { "disabled" }
            ),
            format!(
                "Content: total={} configured={} monetized={}",
                self.metrics.total, self.metrics.configured, self.metrics.monetized
            ),
        ];
        let mut by_type: Vec<_> = self.metrics.by_type.iter().collect();
        by_type.sort();
        for (content_type, count) in by_type {
            lines.push(format!("  - {content_type}: {count}"));
        }
        lines.join("\n")
    }
}
