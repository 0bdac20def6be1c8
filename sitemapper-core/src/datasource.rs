// Row adapter over the supported relational drivers

use crate::error::{Result, SitemapError};
use crate::model::{DatasourceSpec, DriverKind};
use futures::TryStreamExt;
use rusqlite::OpenFlags;
use rusqlite::types::ValueRef;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, Connection as _, Row as _, TypeInfo};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// A loosely typed scalar read from a result set.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

/// One result-set record keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// An open connection to an external datasource.
///
/// Opened once per sitemap generation and closed with [`RowSource::close`]
/// when the rows have been consumed.
pub enum RowSource {
    Sqlite(rusqlite::Connection),
    Postgres(PgConnection),
}

impl RowSource {
    pub async fn connect(spec: &DatasourceSpec) -> Result<Self> {
        let driver: DriverKind = spec.kind.parse()?;
        debug!(datasource = %spec.name, driver = driver.as_str(), "Connecting to datasource");

        match driver {
            DriverKind::Sqlite => {
                // Read-only so a mistyped path fails instead of creating an empty database
                let conn = rusqlite::Connection::open_with_flags(
                    &spec.connection_string,
                    OpenFlags::SQLITE_OPEN_READ_ONLY
                        | OpenFlags::SQLITE_OPEN_URI
                        | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|e| SitemapError::Connection(format!("{}: {}", spec.name, e)))?;
                Ok(RowSource::Sqlite(conn))
            }
            DriverKind::Postgres => {
                let conn = PgConnection::connect(&spec.connection_string)
                    .await
                    .map_err(|e| SitemapError::Connection(format!("{}: {}", spec.name, e)))?;
                Ok(RowSource::Postgres(conn))
            }
        }
    }

    pub fn driver(&self) -> DriverKind {
        match self {
            RowSource::Sqlite(_) => DriverKind::Sqlite,
            RowSource::Postgres(_) => DriverKind::Postgres,
        }
    }

    /// Execute `query` and hand each row to `visit` as it is read.
    ///
    /// The query text is passed through untouched. Returns the number of rows visited.
    pub async fn for_each_row<F>(&mut self, query: &str, mut visit: F) -> Result<usize>
    where
        F: FnMut(Row) + Send,
    {
        debug!(query = %query, "Executing datasource query");

        match self {
            RowSource::Sqlite(conn) => sqlite_for_each(conn, query, &mut visit),
            RowSource::Postgres(conn) => {
                let mut rows = sqlx::query(query).fetch(&mut *conn);
                let mut count = 0;
                while let Some(pg_row) = rows
                    .try_next()
                    .await
                    .map_err(|e| SitemapError::Query(e.to_string()))?
                {
                    visit(pg_to_row(&pg_row)?);
                    count += 1;
                }
                Ok(count)
            }
        }
    }

    pub async fn close(self) {
        match self {
            RowSource::Sqlite(conn) => {
                if let Err((_, e)) = conn.close() {
                    warn!("Failed to close sqlite datasource: {}", e);
                }
            }
            RowSource::Postgres(conn) => {
                if let Err(e) = conn.close().await {
                    warn!("Failed to close postgres datasource: {}", e);
                }
            }
        }
    }
}

// Kept synchronous so no rusqlite statement is held across an await point
fn sqlite_for_each<F>(conn: &rusqlite::Connection, query: &str, visit: &mut F) -> Result<usize>
where
    F: FnMut(Row),
{
    let query_err = |e: rusqlite::Error| SitemapError::Query(e.to_string());

    let mut stmt = conn.prepare(query).map_err(query_err)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query([]).map_err(query_err)?;

    let mut count = 0;
    while let Some(sql_row) = rows.next().map_err(query_err)? {
        let mut row = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = match sql_row.get_ref(idx).map_err(query_err)? {
                ValueRef::Null => Value::Null,
                ValueRef::Integer(i) => Value::Integer(i),
                ValueRef::Real(r) => Value::Real(r),
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    Value::Text(String::from_utf8_lossy(bytes).into_owned())
                }
            };
            row.insert(name.clone(), value);
        }
        visit(row);
        count += 1;
    }

    Ok(count)
}

/// How a Postgres column is decoded into a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Uuid,
    Json,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Bytea,
}

impl PgColumnKind {
    /// Classify a column by its Postgres type name. `None` for types without a decoder.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "BOOL" => PgColumnKind::Bool,
            "INT2" => PgColumnKind::Int2,
            "INT4" => PgColumnKind::Int4,
            "INT8" => PgColumnKind::Int8,
            "FLOAT4" => PgColumnKind::Float4,
            "FLOAT8" => PgColumnKind::Float8,
            "NUMERIC" => PgColumnKind::Numeric,
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "UNKNOWN" => PgColumnKind::Text,
            "UUID" => PgColumnKind::Uuid,
            "JSON" | "JSONB" => PgColumnKind::Json,
            "DATE" => PgColumnKind::Date,
            "TIME" => PgColumnKind::Time,
            "TIMESTAMP" => PgColumnKind::Timestamp,
            "TIMESTAMPTZ" => PgColumnKind::TimestampTz,
            "BYTEA" => PgColumnKind::Bytea,
            _ => return None,
        };
        Some(kind)
    }
}

fn pg_to_row(pg_row: &PgRow) -> Result<Row> {
    let mut row = Row::new();
    for (idx, column) in pg_row.columns().iter().enumerate() {
        let type_name = column.type_info().name();
        let Some(kind) = PgColumnKind::from_type_name(type_name) else {
            return Err(SitemapError::Query(format!(
                "column {} has unsupported type {}",
                column.name(),
                type_name
            )));
        };
        let value = pg_value(pg_row, idx, kind).map_err(|e| {
            SitemapError::Query(format!("column {} ({}): {}", column.name(), type_name, e))
        })?;
        row.insert(column.name(), value);
    }
    Ok(row)
}

fn pg_value(row: &PgRow, idx: usize, kind: PgColumnKind) -> std::result::Result<Value, sqlx::Error> {
    let value = match kind {
        PgColumnKind::Bool => row
            .try_get::<Option<bool>, _>(idx)?
            .map(|b| Value::Integer(i64::from(b))),
        PgColumnKind::Int2 => row
            .try_get::<Option<i16>, _>(idx)?
            .map(|v| Value::Integer(v.into())),
        PgColumnKind::Int4 => row
            .try_get::<Option<i32>, _>(idx)?
            .map(|v| Value::Integer(v.into())),
        PgColumnKind::Int8 => row.try_get::<Option<i64>, _>(idx)?.map(Value::Integer),
        PgColumnKind::Float4 => row
            .try_get::<Option<f32>, _>(idx)?
            .map(|v| Value::Real(v.into())),
        PgColumnKind::Float8 => row.try_get::<Option<f64>, _>(idx)?.map(Value::Real),
        // Kept as text so precision survives into URLs
        PgColumnKind::Numeric => row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|v| Value::Text(v.to_string())),
        PgColumnKind::Text => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
        PgColumnKind::Uuid => row
            .try_get::<Option<Uuid>, _>(idx)?
            .map(|v| Value::Text(v.to_string())),
        PgColumnKind::Json => row.try_get::<Option<JsonValue>, _>(idx)?.map(|v| match v {
            JsonValue::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }),
        PgColumnKind::Date => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)?
            .map(|v| Value::Text(v.format("%Y-%m-%d").to_string())),
        PgColumnKind::Time => row
            .try_get::<Option<chrono::NaiveTime>, _>(idx)?
            .map(|v| Value::Text(v.to_string())),
        PgColumnKind::Timestamp => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)?
            .map(|v| Value::Text(v.and_utc().to_rfc3339())),
        PgColumnKind::TimestampTz => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)?
            .map(|v| Value::Text(v.to_rfc3339())),
        PgColumnKind::Bytea => row
            .try_get::<Option<Vec<u8>>, _>(idx)?
            .map(|v| Value::Text(String::from_utf8_lossy(&v).into_owned())),
    };

    Ok(value.unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_fixture(rows: usize) -> (TempDir, DatasourceSpec) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("source.db");
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "CREATE TABLE pages (id INTEGER PRIMARY KEY, slug TEXT, score REAL, raw BLOB, note TEXT);",
        )
        .unwrap();
        for i in 0..rows {
            conn.execute(
                "INSERT INTO pages (slug, score, raw, note) VALUES (?1, ?2, ?3, NULL)",
                rusqlite::params![format!("page-{}", i), 0.5, b"bytes".to_vec()],
            )
            .unwrap();
        }

        let spec = DatasourceSpec {
            id: 1,
            name: "fixture".to_string(),
            kind: "sqlite".to_string(),
            connection_string: db_path.to_string_lossy().to_string(),
        };
        (temp_dir, spec)
    }

    #[tokio::test]
    async fn test_sqlite_rows_are_normalized() {
        let (_temp_dir, spec) = sqlite_fixture(1);
        let mut source = RowSource::connect(&spec).await.unwrap();
        assert_eq!(source.driver(), DriverKind::Sqlite);

        let mut rows = Vec::new();
        let count = source
            .for_each_row("SELECT * FROM pages", |row| rows.push(row))
            .await
            .unwrap();
        source.close().await;

        assert_eq!(count, 1);
        let row = &rows[0];
        assert_eq!(row.get("id"), Some(&Value::Integer(1)));
        assert_eq!(row.get("slug"), Some(&Value::Text("page-0".to_string())));
        assert_eq!(row.get("score"), Some(&Value::Real(0.5)));
        assert_eq!(row.get("raw"), Some(&Value::Text("bytes".to_string())));
        assert_eq!(row.get("note"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_sqlite_query_error() {
        let (_temp_dir, spec) = sqlite_fixture(0);
        let mut source = RowSource::connect(&spec).await.unwrap();

        let result = source
            .for_each_row("SELECT * FROM missing_table", |_| {})
            .await;
        assert!(matches!(result, Err(SitemapError::Query(_))));
    }

    #[tokio::test]
    async fn test_missing_sqlite_file_is_connection_error() {
        let temp_dir = TempDir::new().unwrap();
        let spec = DatasourceSpec {
            id: 1,
            name: "missing".to_string(),
            kind: "sqlite".to_string(),
            connection_string: temp_dir
                .path()
                .join("nope.db")
                .to_string_lossy()
                .to_string(),
        };

        let result = RowSource::connect(&spec).await;
        assert!(matches!(result, Err(SitemapError::Connection(_))));
    }

    #[tokio::test]
    async fn test_unsupported_driver() {
        let spec = DatasourceSpec {
            id: 1,
            name: "legacy".to_string(),
            kind: "oracle".to_string(),
            connection_string: String::new(),
        };

        let result = RowSource::connect(&spec).await;
        assert!(matches!(result, Err(SitemapError::UnsupportedDriver(_))));
    }

    #[test]
    fn test_pg_column_classification() {
        assert_eq!(PgColumnKind::from_type_name("UUID"), Some(PgColumnKind::Uuid));
        assert_eq!(PgColumnKind::from_type_name("NUMERIC"), Some(PgColumnKind::Numeric));
        assert_eq!(PgColumnKind::from_type_name("JSONB"), Some(PgColumnKind::Json));
        assert_eq!(PgColumnKind::from_type_name("JSON"), Some(PgColumnKind::Json));
        assert_eq!(PgColumnKind::from_type_name("TIME"), Some(PgColumnKind::Time));
        assert_eq!(PgColumnKind::from_type_name("VARCHAR"), Some(PgColumnKind::Text));
        assert_eq!(PgColumnKind::from_type_name("INT8"), Some(PgColumnKind::Int8));

        // No decoder: the row fails instead of rendering an empty value
        assert_eq!(PgColumnKind::from_type_name("INET"), None);
        assert_eq!(PgColumnKind::from_type_name("INT4[]"), None);
        assert_eq!(PgColumnKind::from_type_name("TEXT[]"), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Integer(42).to_string(), "42");
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Real(2.0).to_string(), "2");
        assert_eq!(Value::from("en").to_string(), "en");
        assert_eq!(Value::Null.to_string(), "");
    }
}
