use crate::error::Result;
use crate::model::{DatasourceSpec, SitemapIndexSpec};
use chrono::{DateTime, Utc};

/// Read access to sitemap configuration plus the generation stamps the engine writes back.
///
/// Passed to the generator explicitly; [`crate::catalog::Catalog`] is the bundled implementation.
pub trait SitemapStore: Send + Sync {
    /// One index with its children in generation order. Unknown ids are `NotFound`.
    fn sitemap_index(&self, id: i64) -> Result<SitemapIndexSpec>;

    fn sitemap_index_ids(&self) -> Result<Vec<i64>>;

    fn datasource(&self, id: i64) -> Result<DatasourceSpec>;

    /// `file_path` is the first written file; `None` keeps the previous path.
    fn record_sitemap_generation(
        &self,
        sitemap_id: i64,
        at: DateTime<Utc>,
        file_path: Option<&str>,
    ) -> Result<()>;

    fn record_index_generation(&self, index_id: i64, at: DateTime<Utc>) -> Result<()>;
}
