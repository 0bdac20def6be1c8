use thiserror::Error;

#[derive(Error, Debug)]
pub enum SitemapError {
    #[error("Unsupported datasource driver: {0}")]
    UnsupportedDriver(String),

    #[error("Datasource connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Storage write failed: {0}")]
    Storage(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] rusqlite::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SitemapError>;
