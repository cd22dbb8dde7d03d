use std::collections::HashMap;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::sqlite::configure_connection;

use super::models::{ContentAdConfig, ContentMetrics, ContentRecord, WriteMode};
use super::{StoreError, StoreResult};

const CONTENT_SCHEMA: &str = include_str!("../../../sql/content.sql");

// Stored schedules are written as compact JSON starting with the pre-roll, so
// anything not shaped like `[0]` or `[0,...` cannot decode.
const UNCONFIGURED: &str = "(duration_seconds IS NULL
    OR ad_breaks IS NULL
    OR ad_breaks NOT GLOB '[[]0[],]*'
    OR vast_tag_url IS NULL
    OR TRIM(vast_tag_url) = '')";

/// Read/write boundary the planner needs from the content catalogue. Every
/// call stands alone; no cross-row transaction is assumed.
pub trait ContentStore {
    /// Rows missing any of `duration_seconds`, `ad_breaks` or `vast_tag_url`.
    /// A blank tag or an undecodable schedule counts as missing.
    fn fetch_unconfigured(&self) -> StoreResult<Vec<ContentRecord>>;

    fn fetch_by_id(&self, content_id: &str) -> StoreResult<Option<ContentRecord>>;

    fn apply_ad_config(
        &self,
        content_id: &str,
        config: &ContentAdConfig,
        mode: WriteMode,
    ) -> StoreResult<()>;
}

#[derive(Debug, Clone)]
pub struct SqliteContentStoreBuilder {
    path: Option<PathBuf>,
    create_if_missing: bool,
}

impl Default for SqliteContentStoreBuilder {
    fn default() -> Self {
        Self {
            path: None,
            create_if_missing: true,
        }
    }
}

impl SqliteContentStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    pub fn build(self) -> StoreResult<SqliteContentStore> {
        let path = self.path.ok_or(StoreError::MissingStore)?;
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE;
        if self.create_if_missing {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        Ok(SqliteContentStore { path, flags })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteContentStore {
    path: PathBuf,
    flags: OpenFlags,
}

impl SqliteContentStore {
    pub fn builder() -> SqliteContentStoreBuilder {
        SqliteContentStoreBuilder::new()
    }

    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        SqliteContentStoreBuilder::new().path(path).build()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> StoreResult<Connection> {
        let conn = Connection::open_with_flags(&self.path, self.flags).map_err(|source| {
            StoreError::OpenDatabase {
                path: self.path.clone(),
                source,
            }
        })?;
        configure_connection(&conn).map_err(|source| StoreError::OpenDatabase {
            path: self.path.clone(),
            source,
        })?;
        Ok(conn)
    }

    pub fn initialize(&self) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute_batch(CONTENT_SCHEMA)?;
        Ok(())
    }

    pub fn upsert_content(&self, record: &ContentRecord) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO content (
                id, content_type, title, duration_seconds, ad_breaks, vast_tag_url,
                monetization_enabled, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP
            )
            ON CONFLICT(id) DO UPDATE SET
                content_type = excluded.content_type,
                title = excluded.title,
                duration_seconds = excluded.duration_seconds,
                ad_breaks = excluded.ad_breaks,
                vast_tag_url = excluded.vast_tag_url,
                monetization_enabled = excluded.monetization_enabled,
                updated_at = excluded.updated_at",
            params![
                &record.id,
                &record.content_type,
                &record.title,
                &record.ad_config.duration_seconds,
                &record.ad_config.ad_breaks,
                &record.ad_config.vast_tag_url,
                record.ad_config.monetization_enabled,
            ],
        )?;
        Ok(())
    }

    pub fn delete(&self, content_id: &str) -> StoreResult<()> {
        let conn = self.open()?;
        conn.execute("DELETE FROM content WHERE id = ?1", [content_id])?;
        Ok(())
    }

    pub fn list(&self, unconfigured_only: bool, limit: usize) -> StoreResult<Vec<ContentRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM content
             WHERE ?1 = 0 OR {UNCONFIGURED}
             ORDER BY (updated_at IS NULL) ASC, updated_at DESC, created_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![unconfigured_only, limit as i64], |row| {
                ContentRecord::from_row(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_by_type(&self) -> StoreResult<HashMap<String, usize>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT content_type, COUNT(*) FROM content GROUP BY content_type")?;
        let mut map = HashMap::new();
        for row in stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })? {
            let (content_type, count) = row?;
            map.insert(content_type, count as usize);
        }
        Ok(map)
    }

    pub fn compute_metrics(&self) -> StoreResult<ContentMetrics> {
        let by_type = self.count_by_type()?;
        let total = by_type.values().copied().sum();

        let conn = self.open()?;
        let configured: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM content WHERE NOT {UNCONFIGURED}"),
            [],
            |row| row.get(0),
        )?;
        let monetized: i64 = conn.query_row(
            "SELECT COUNT(*) FROM content WHERE monetization_enabled = 1",
            [],
            |row| row.get(0),
        )?;

        Ok(ContentMetrics {
            total,
            configured: configured as usize,
            monetized: monetized as usize,
            by_type,
        })
    }
}

impl ContentStore for SqliteContentStore {
    fn fetch_unconfigured(&self) -> StoreResult<Vec<ContentRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM content
             WHERE {UNCONFIGURED}
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt
            .query_map([], |row| ContentRecord::from_row(row))?
            .collect::<Result<Vec<_>, _>>()?;
        debug!(target: "content_store", count = rows.len(), "fetched unconfigured content");
        Ok(rows)
    }

    fn fetch_by_id(&self, content_id: &str) -> StoreResult<Option<ContentRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare("SELECT * FROM content WHERE id = ?1")?;
        let record = stmt
            .query_row([content_id], |row| ContentRecord::from_row(row))
            .optional()?;
        Ok(record)
    }

    fn apply_ad_config(
        &self,
        content_id: &str,
        config: &ContentAdConfig,
        mode: WriteMode,
    ) -> StoreResult<()> {
        let conn = self.open()?;
        let sql = match mode {
            // COALESCE keeps values a concurrent writer may have set since the scan.
            WriteMode::FillGaps => {
                "UPDATE content
                 SET duration_seconds = COALESCE(duration_seconds, ?2),
                     ad_breaks = COALESCE(ad_breaks, ?3),
                     vast_tag_url = COALESCE(NULLIF(TRIM(vast_tag_url), ''), ?4),
                     monetization_enabled = ?5,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1"
            }
            WriteMode::RepairAdBreaks => {
                "UPDATE content
                 SET duration_seconds = COALESCE(duration_seconds, ?2),
                     ad_breaks = ?3,
                     vast_tag_url = COALESCE(NULLIF(TRIM(vast_tag_url), ''), ?4),
                     monetization_enabled = ?5,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1"
            }
            WriteMode::Overwrite => {
                "UPDATE content
                 SET duration_seconds = ?2,
                     ad_breaks = ?3,
                     vast_tag_url = ?4,
                     monetization_enabled = ?5,
                     updated_at = CURRENT_TIMESTAMP
                 WHERE id = ?1"
            }
        };
        let affected = conn.execute(
            sql,
            params![
                content_id,
                &config.duration_seconds,
                &config.ad_breaks,
                &config.vast_tag_url,
                config.monetization_enabled,
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound {
                content_id: content_id.to_string(),
            });
        }
        Ok(())
    }
}
