//! Sitemap generation engine.
//!
//! For each index the generator walks its sitemaps in order, streams rows out of
//! the sitemap's datasource, renders them into URL sets and hands the XML to the
//! index's storage sink. Standard sitemaps are paginated into numbered chunk
//! files; news sitemaps always produce one file. The index document listing
//! every chunk is written last.
//!
//! A failing sitemap is logged and left out of the index. A failing index write
//! is returned to the caller. Regeneration overwrites files in place; chunks
//! from an earlier, larger run are not removed.

use crate::datasource::RowSource;
use crate::error::Result;
use crate::model::{SitemapIndexSpec, SitemapKind, SitemapSpec, StorageMode};
use crate::news::news_metadata;
use crate::render::render_url;
use crate::sitemap::{SitemapIndexDoc, SitemapRef, UrlEntry, UrlSetDoc};
use crate::storage::StorageSink;
use crate::store::SitemapStore;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub const PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Root directory for local storage targets.
    pub output_dir: PathBuf,
    /// Rows per standard sitemap chunk.
    pub page_size: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("sitemaps"),
            page_size: PAGE_SIZE,
        }
    }
}

/// Files written for one sitemap.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedSitemap {
    pub sitemap_id: i64,
    pub name: String,
    pub files: Vec<String>,
    pub url_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSitemap {
    pub sitemap_id: i64,
    pub name: String,
    pub error: String,
}

/// Outcome of one index run.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexReport {
    pub index_id: i64,
    pub index_file: String,
    pub sitemaps: Vec<GeneratedSitemap>,
    pub skipped: Vec<SkippedSitemap>,
}

impl IndexReport {
    pub fn file_count(&self) -> usize {
        self.sitemaps.iter().map(|s| s.files.len()).sum()
    }
}

/// Base query for a sitemap source.
///
/// The configured table name is trusted input: a full `SELECT` is used as is,
/// anything else is treated as a table name and left unquoted.
pub fn base_query(table_name: &str) -> String {
    let trimmed = table_name.trim();
    let is_select = trimmed.get(..6).is_some_and(|head| head.eq_ignore_ascii_case("select"))
        && trimmed[6..].starts_with(char::is_whitespace);
    if is_select {
        trimmed.to_string()
    } else {
        format!("SELECT * FROM {}", trimmed)
    }
}

fn file_stem(name: &str) -> &str {
    name.strip_suffix(".xml").unwrap_or(name)
}

#[derive(Clone)]
pub struct Generator {
    store: Arc<dyn SitemapStore>,
    config: GeneratorConfig,
}

impl Generator {
    pub fn new(store: Arc<dyn SitemapStore>, config: GeneratorConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// Load an index from the store and generate it.
    pub async fn generate_index(&self, index_id: i64) -> Result<IndexReport> {
        let index = self.store.sitemap_index(index_id)?;
        self.generate_index_spec(&index).await
    }

    /// Generate every sitemap of `index`, then the index document.
    pub async fn generate_index_spec(&self, index: &SitemapIndexSpec) -> Result<IndexReport> {
        info!(
            index = %index.name,
            sitemaps = index.sitemaps.len(),
            storage = index.storage.mode.as_str(),
            "Generating sitemap index"
        );

        if index.storage.mode == StorageMode::Local {
            tokio::fs::create_dir_all(&self.config.output_dir).await?;
        }
        let sink = StorageSink::for_target(&index.storage, &self.config.output_dir).await?;

        let generated_at = Utc::now();
        let lastmod = generated_at.format("%Y-%m-%d").to_string();

        let mut entries = Vec::new();
        let mut generated = Vec::new();
        let mut skipped = Vec::new();

        for sitemap in &index.sitemaps {
            match self.generate_sitemap(sitemap, &sink).await {
                Ok(result) => {
                    let host = sitemap.source.base_url.trim_end_matches('/');
                    entries.extend(result.files.iter().map(|file| SitemapRef {
                        location: format!("https://{}/{}", host, file),
                        last_modified: Some(lastmod.clone()),
                    }));
                    generated.push(result);
                }
                Err(e) => {
                    error!(index = %index.name, sitemap = %sitemap.name, "Error generating sitemap: {}", e);
                    skipped.push(SkippedSitemap {
                        sitemap_id: sitemap.id,
                        name: sitemap.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let index_file = format!("{}.xml", file_stem(&index.name));
        let document = SitemapIndexDoc { sitemaps: entries }.to_xml()?;
        sink.write(&index_file, document).await?;
        info!(
            index = %index.name,
            location = %sink.location(&index_file),
            entries = generated.iter().map(|s| s.files.len()).sum::<usize>(),
            skipped = skipped.len(),
            "Wrote sitemap index"
        );

        // Stamps are best effort; written files stay in place either way
        for result in &generated {
            let first = result.files.first().map(String::as_str);
            if let Err(e) = self
                .store
                .record_sitemap_generation(result.sitemap_id, generated_at, first)
            {
                warn!(sitemap = %result.name, "Failed to record sitemap generation: {}", e);
            }
        }
        if let Err(e) = self.store.record_index_generation(index.id, generated_at) {
            warn!(index = %index.name, "Failed to record index generation: {}", e);
        }

        Ok(IndexReport {
            index_id: index.id,
            index_file,
            sitemaps: generated,
            skipped,
        })
    }

    /// Generate one sitemap's files into `sink`.
    ///
    /// The datasource connection lives for this call only.
    pub async fn generate_sitemap(
        &self,
        sitemap: &SitemapSpec,
        sink: &StorageSink,
    ) -> Result<GeneratedSitemap> {
        let datasource = self.store.datasource(sitemap.source.datasource_id)?;
        let mut source = RowSource::connect(&datasource).await?;

        let result = match sitemap.kind {
            SitemapKind::News => self.write_news(sitemap, &mut source, sink).await,
            SitemapKind::Standard => self.write_pages(sitemap, &mut source, sink).await,
        };
        source.close().await;

        let (files, url_count) = result?;
        info!(
            sitemap = %sitemap.name,
            kind = sitemap.kind.as_str(),
            files = files.len(),
            urls = url_count,
            "Generated sitemap"
        );

        Ok(GeneratedSitemap {
            sitemap_id: sitemap.id,
            name: sitemap.name.clone(),
            files,
            url_count,
        })
    }

    async fn write_news(
        &self,
        sitemap: &SitemapSpec,
        source: &mut RowSource,
        sink: &StorageSink,
    ) -> Result<(Vec<String>, usize)> {
        let spec = &sitemap.source;
        let mut urls = Vec::new();
        let mut unusable = 0usize;

        source
            .for_each_row(&base_query(&spec.table_name), |row| {
                match news_metadata(&row, &spec.publication_name, &spec.default_language) {
                    Ok(news) => urls.push(UrlEntry {
                        location: render_url(&spec.base_url, &spec.url_pattern, &row),
                        news: Some(news),
                        ..Default::default()
                    }),
                    Err(issue) => {
                        unusable += 1;
                        warn!(sitemap = %sitemap.name, title = %issue, "Skipping news row without a usable title");
                    }
                }
            })
            .await?;

        if unusable > 0 {
            debug!(sitemap = %sitemap.name, skipped = unusable, "News rows skipped");
        }

        let url_count = urls.len();
        let file_name = format!("{}.xml", file_stem(&sitemap.name));
        let document = UrlSetDoc {
            news_namespace: true,
            urls,
        };
        sink.write(&file_name, document.to_xml()?).await?;

        Ok((vec![file_name], url_count))
    }

    async fn write_pages(
        &self,
        sitemap: &SitemapSpec,
        source: &mut RowSource,
        sink: &StorageSink,
    ) -> Result<(Vec<String>, usize)> {
        let spec = &sitemap.source;
        let base = base_query(&spec.table_name);
        let page_size = self.config.page_size.max(1);

        let mut files = Vec::new();
        let mut offset = 0usize;
        let mut chunk = 1usize;

        loop {
            let query = format!("{} LIMIT {} OFFSET {}", base, page_size, offset);
            let mut urls = Vec::with_capacity(page_size);
            let returned = source
                .for_each_row(&query, |row| {
                    urls.push(UrlEntry {
                        location: render_url(&spec.base_url, &spec.url_pattern, &row),
                        change_frequency: spec.change_frequency.clone(),
                        priority: spec.priority,
                        ..Default::default()
                    })
                })
                .await?;

            if returned == 0 {
                break;
            }

            let file_name = format!("{}-{:04}.xml", file_stem(&sitemap.name), chunk);
            let document = UrlSetDoc {
                news_namespace: false,
                urls,
            };
            sink.write(&file_name, document.to_xml()?).await?;
            debug!(sitemap = %sitemap.name, file = %file_name, rows = returned, "Wrote sitemap chunk");

            files.push(file_name);
            offset += returned;
            chunk += 1;
        }

        Ok((files, offset))
    }

    /// Generate every index in the store, one after another.
    ///
    /// Per-index failures are logged; only a failure to list indexes is returned.
    pub async fn generate_all(&self) -> Result<Vec<IndexReport>> {
        let ids = self.store.sitemap_index_ids()?;
        info!(indexes = ids.len(), "Generating all sitemap indexes");

        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            match self.generate_index(id).await {
                Ok(report) => reports.push(report),
                Err(e) => error!(index_id = id, "Error generating sitemap index: {}", e),
            }
        }
        Ok(reports)
    }

    /// Run [`Generator::generate_index`] in the background.
    pub fn spawn_index(&self, index_id: i64) -> JoinHandle<()> {
        let generator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = generator.generate_index(index_id).await {
                error!(index_id, "Background sitemap generation failed: {}", e);
            }
        })
    }

    /// Run [`Generator::generate_all`] in the background.
    pub fn spawn_all(&self) -> JoinHandle<()> {
        let generator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = generator.generate_all().await {
                error!("Background sitemap generation failed: {}", e);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_query() {
        assert_eq!(base_query("articles"), "SELECT * FROM articles");
        assert_eq!(
            base_query("select slug from articles where published = 1"),
            "select slug from articles where published = 1"
        );
        assert_eq!(base_query("  SELECT id FROM t "), "SELECT id FROM t");
        assert_eq!(base_query("selections"), "SELECT * FROM selections");
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("pages.xml"), "pages");
        assert_eq!(file_stem("pages"), "pages");
    }
}
