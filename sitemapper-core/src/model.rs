use crate::error::SitemapError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_PUBLICATION_NAME: &str = "Default News Publication";
pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_STORAGE_PATH: &str = "sitemaps/";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SitemapKind {
    Standard,
    News,
}

impl SitemapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SitemapKind::Standard => "standard",
            SitemapKind::News => "news",
        }
    }

    /// Anything other than `news` is a standard, paginated sitemap.
    pub fn from_db(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("news") {
            SitemapKind::News
        } else {
            SitemapKind::Standard
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageMode {
    Local,
    S3,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::S3 => "s3",
        }
    }

    pub fn from_db(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("s3") {
            StorageMode::S3
        } else {
            StorageMode::Local
        }
    }
}

/// Where the files of one sitemap index end up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageTarget {
    pub mode: StorageMode,
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub path_prefix: String,
}

impl Default for StorageTarget {
    fn default() -> Self {
        Self {
            mode: StorageMode::Local,
            bucket: String::new(),
            region: String::new(),
            endpoint: None,
            path_prefix: DEFAULT_STORAGE_PATH.to_string(),
        }
    }
}

/// Query and rendering settings for a single sitemap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub datasource_id: i64,
    /// Trusted admin input, spliced verbatim into the query text.
    pub table_name: String,
    pub base_url: String,
    pub url_pattern: String,
    pub change_frequency: Option<String>,
    pub priority: Option<f64>,
    pub publication_name: String,
    pub default_language: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapSpec {
    pub id: i64,
    pub index_id: i64,
    pub name: String,
    pub kind: SitemapKind,
    pub source: SourceSpec,
    pub last_generation: Option<DateTime<Utc>>,
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SitemapIndexSpec {
    pub id: i64,
    pub name: String,
    pub last_generation: Option<DateTime<Utc>>,
    pub sitemaps: Vec<SitemapSpec>,
    pub storage: StorageTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceSpec {
    pub id: i64,
    pub name: String,
    /// Raw driver name as configured; resolved with [`DriverKind::from_str`].
    pub kind: String,
    pub connection_string: String,
}

/// The closed set of relational engines a datasource may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Sqlite,
    Postgres,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::Sqlite => "sqlite",
            DriverKind::Postgres => "pgsql",
        }
    }
}

impl FromStr for DriverKind {
    type Err = SitemapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DriverKind::Sqlite),
            "pgsql" | "postgres" | "postgresql" => Ok(DriverKind::Postgres),
            other => Err(SitemapError::UnsupportedDriver(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_kind_aliases() {
        assert_eq!("sqlite".parse::<DriverKind>().unwrap(), DriverKind::Sqlite);
        assert_eq!("PGSQL".parse::<DriverKind>().unwrap(), DriverKind::Postgres);
        assert_eq!("postgres".parse::<DriverKind>().unwrap(), DriverKind::Postgres);
    }

    #[test]
    fn test_driver_kind_unsupported() {
        let err = "mysql".parse::<DriverKind>().unwrap_err();
        assert!(matches!(err, SitemapError::UnsupportedDriver(ref d) if d == "mysql"));
    }

    #[test]
    fn test_sitemap_kind_defaults_to_standard() {
        assert_eq!(SitemapKind::from_db("news"), SitemapKind::News);
        assert_eq!(SitemapKind::from_db("News "), SitemapKind::News);
        assert_eq!(SitemapKind::from_db(""), SitemapKind::Standard);
        assert_eq!(SitemapKind::from_db("pages"), SitemapKind::Standard);
    }
}
