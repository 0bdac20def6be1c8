use crate::error::{Result, SitemapError};
use crate::model::{
    DEFAULT_LANGUAGE, DEFAULT_PUBLICATION_NAME, DEFAULT_STORAGE_PATH, DatasourceSpec, SitemapIndexSpec,
    SitemapKind, SitemapSpec, SourceSpec, StorageMode, StorageTarget,
};
use crate::store::SitemapStore;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed sitemap configuration.
pub struct Catalog {
    conn: Mutex<Connection>,
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.filter(|s| !s.trim().is_empty())
}

impl Catalog {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let catalog = Catalog {
            conn: Mutex::new(conn),
        };
        catalog.init_schema()?;
        debug!(path = %path.display(), "Opened catalog");
        Ok(catalog)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let catalog = Catalog {
            conn: Mutex::new(conn),
        };
        catalog.init_schema()?;
        Ok(catalog)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves nothing half-applied that sqlite would not roll back
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(&format!(
            "
            CREATE TABLE IF NOT EXISTS datasources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                type TEXT NOT NULL,
                connection_string TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sitemap_indexes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                last_generation TEXT
            );

            -- One storage config per index
            CREATE TABLE IF NOT EXISTS storage_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sitemap_index_id INTEGER NOT NULL UNIQUE,
                mode TEXT NOT NULL DEFAULT 'local' CHECK(mode IN ('local', 's3')),
                bucket TEXT NOT NULL DEFAULT '',
                region TEXT NOT NULL DEFAULT '',
                endpoint TEXT,
                path TEXT NOT NULL DEFAULT '{storage_path}',
                FOREIGN KEY(sitemap_index_id) REFERENCES sitemap_indexes(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS sitemaps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sitemap_index_id INTEGER NOT NULL,
                name TEXT NOT NULL,
                type TEXT NOT NULL DEFAULT '',
                last_generation TEXT,
                file_path TEXT,
                FOREIGN KEY(sitemap_index_id) REFERENCES sitemap_indexes(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_sitemaps_index ON sitemaps(sitemap_index_id);

            CREATE TABLE IF NOT EXISTS sitemap_configs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sitemap_id INTEGER NOT NULL UNIQUE,
                datasource_id INTEGER NOT NULL,
                table_name TEXT NOT NULL,   -- table name or full SELECT, used verbatim
                base_url TEXT NOT NULL,
                url_pattern TEXT NOT NULL,
                change_frequency TEXT,
                priority REAL,
                publication_name TEXT NOT NULL DEFAULT '{publication}',
                default_language TEXT NOT NULL DEFAULT '{language}',
                FOREIGN KEY(sitemap_id) REFERENCES sitemaps(id) ON DELETE CASCADE
            );
            ",
            storage_path = DEFAULT_STORAGE_PATH,
            publication = DEFAULT_PUBLICATION_NAME,
            language = DEFAULT_LANGUAGE,
        ))?;
        Ok(())
    }

    pub fn add_datasource(&self, name: &str, kind: &str, connection_string: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO datasources (name, type, connection_string) VALUES (?1, ?2, ?3)",
            params![name, kind, connection_string],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Create an index together with its storage settings.
    pub fn add_sitemap_index(&self, name: &str, storage: &StorageTarget) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sitemap_indexes (name) VALUES (?1)",
            params![name],
        )?;
        let index_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO storage_configs (sitemap_index_id, mode, bucket, region, endpoint, path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                index_id,
                storage.mode.as_str(),
                storage.bucket,
                storage.region,
                storage.endpoint,
                storage.path_prefix
            ],
        )?;

        tx.commit()?;
        Ok(index_id)
    }

    /// Attach a sitemap and its source settings to an index.
    pub fn add_sitemap(
        &self,
        index_id: i64,
        name: &str,
        kind: SitemapKind,
        source: &SourceSpec,
    ) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO sitemaps (sitemap_index_id, name, type) VALUES (?1, ?2, ?3)",
            params![index_id, name, kind.as_str()],
        )?;
        let sitemap_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO sitemap_configs (sitemap_id, datasource_id, table_name, base_url, url_pattern,
                                          change_frequency, priority, publication_name, default_language)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                sitemap_id,
                source.datasource_id,
                source.table_name,
                source.base_url,
                source.url_pattern,
                source.change_frequency,
                source.priority,
                source.publication_name,
                source.default_language
            ],
        )?;

        tx.commit()?;
        Ok(sitemap_id)
    }

    pub fn sitemap(&self, id: i64) -> Result<SitemapSpec> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{} WHERE sm.id = ?1", SITEMAP_SELECT))?;
        stmt.query_row(params![id], sitemap_from_row)
            .optional()?
            .ok_or_else(|| SitemapError::NotFound(format!("sitemap {}", id)))
    }

    fn sitemaps_for_index(conn: &Connection, index_id: i64) -> Result<Vec<SitemapSpec>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE sm.sitemap_index_id = ?1 ORDER BY sm.id",
            SITEMAP_SELECT
        ))?;
        let sitemaps = stmt
            .query_map(params![index_id], sitemap_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(sitemaps)
    }
}

// Sitemaps without a config row still load; their empty query fails at generation time
const SITEMAP_SELECT: &str = "
    SELECT sm.id, sm.sitemap_index_id, sm.name, sm.type, sm.last_generation, sm.file_path,
           c.datasource_id, c.table_name, c.base_url, c.url_pattern, c.change_frequency,
           c.priority, c.publication_name, c.default_language
    FROM sitemaps sm
    LEFT JOIN sitemap_configs c ON c.sitemap_id = sm.id";

fn sitemap_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SitemapSpec> {
    let kind: String = row.get(3)?;
    Ok(SitemapSpec {
        id: row.get(0)?,
        index_id: row.get(1)?,
        name: row.get(2)?,
        kind: SitemapKind::from_db(&kind),
        last_generation: parse_timestamp(row.get(4)?),
        file_path: non_empty(row.get(5)?),
        source: SourceSpec {
            datasource_id: row.get::<_, Option<i64>>(6)?.unwrap_or_default(),
            table_name: row.get::<_, Option<String>>(7)?.unwrap_or_default(),
            base_url: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
            url_pattern: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
            change_frequency: non_empty(row.get(10)?),
            priority: row.get(11)?,
            publication_name: non_empty(row.get(12)?)
                .unwrap_or_else(|| DEFAULT_PUBLICATION_NAME.to_string()),
            default_language: non_empty(row.get(13)?)
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        },
    })
}

impl SitemapStore for Catalog {
    fn sitemap_index(&self, id: i64) -> Result<SitemapIndexSpec> {
        let conn = self.conn();

        let index = conn
            .query_row(
                "SELECT i.id, i.name, i.last_generation,
                        s.mode, s.bucket, s.region, s.endpoint, s.path
                 FROM sitemap_indexes i
                 LEFT JOIN storage_configs s ON s.sitemap_index_id = i.id
                 WHERE i.id = ?1",
                params![id],
                |row| {
                    let defaults = StorageTarget::default();
                    let mode: Option<String> = row.get(3)?;
                    Ok(SitemapIndexSpec {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        last_generation: parse_timestamp(row.get(2)?),
                        sitemaps: Vec::new(),
                        storage: StorageTarget {
                            mode: mode.as_deref().map_or(defaults.mode, StorageMode::from_db),
                            bucket: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                            region: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                            endpoint: non_empty(row.get(6)?),
                            path_prefix: row
                                .get::<_, Option<String>>(7)?
                                .unwrap_or(defaults.path_prefix),
                        },
                    })
                },
            )
            .optional()?;

        let mut index = index.ok_or_else(|| SitemapError::NotFound(format!("sitemap index {}", id)))?;
        index.sitemaps = Self::sitemaps_for_index(&conn, id)?;
        Ok(index)
    }

    fn sitemap_index_ids(&self) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM sitemap_indexes ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn datasource(&self, id: i64) -> Result<DatasourceSpec> {
        self.conn()
            .query_row(
                "SELECT id, name, type, connection_string FROM datasources WHERE id = ?1",
                params![id],
                |row| {
                    Ok(DatasourceSpec {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        kind: row.get(2)?,
                        connection_string: row.get(3)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| SitemapError::NotFound(format!("datasource {}", id)))
    }

    fn record_sitemap_generation(
        &self,
        sitemap_id: i64,
        at: DateTime<Utc>,
        file_path: Option<&str>,
    ) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE sitemaps SET last_generation = ?1, file_path = COALESCE(?2, file_path) WHERE id = ?3",
            params![at.to_rfc3339(), file_path, sitemap_id],
        )?;
        if updated == 0 {
            return Err(SitemapError::NotFound(format!("sitemap {}", sitemap_id)));
        }
        Ok(())
    }

    fn record_index_generation(&self, index_id: i64, at: DateTime<Utc>) -> Result<()> {
        let updated = self.conn().execute(
            "UPDATE sitemap_indexes SET last_generation = ?1 WHERE id = ?2",
            params![at.to_rfc3339(), index_id],
        )?;
        if updated == 0 {
            return Err(SitemapError::NotFound(format!("sitemap index {}", index_id)));
        }
        Ok(())
    }
}
