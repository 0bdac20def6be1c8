use crate::error::{Result, ValidateError};
use crate::gate::AdmissionGate;
use crate::log::ResultLog;
use crate::result::ValidationRow;
use reqwest::{Client, StatusCode};
use sitemapper_core::sitemap::{SitemapDocument, parse_document};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const INVALID_FORMAT: &str = "Invalid XML format: not a valid sitemap index or URL set";

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Timeout for sitemap document GETs.
    pub fetch_timeout: Duration,
    /// Timeout for leaf URL HEAD checks.
    pub head_timeout: Duration,
    pub max_redirects: usize,
    /// Concurrent child sitemap validations per job.
    pub sitemap_concurrency: usize,
    /// Concurrent leaf URL checks per job.
    pub url_concurrency: usize,
    pub user_agent: String,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(30),
            head_timeout: Duration::from_secs(5),
            max_redirects: 10,
            sitemap_concurrency: 5,
            url_concurrency: 10,
            user_agent: format!("sitemapper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// The two job-wide admission gates.
#[derive(Debug, Clone)]
pub struct Gates {
    pub sitemaps: AdmissionGate,
    pub urls: AdmissionGate,
}

impl Gates {
    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            sitemaps: AdmissionGate::new(config.sitemap_concurrency),
            urls: AdmissionGate::new(config.url_concurrency),
        }
    }
}

/// Why a sitemap document could not be fetched.
struct FetchFailure {
    status_code: u16,
    detail: String,
}

/// Crawls a sitemap tree and records one result row per checked resource.
///
/// The root may be a sitemap index or a URL set. Children of an index must be
/// URL sets; a nested index is reported, not followed.
#[derive(Clone)]
pub struct Validator {
    fetch_client: Client,
    head_client: Client,
    config: ValidatorConfig,
}

impl Validator {
    pub fn new() -> Result<Self> {
        Self::from_config(ValidatorConfig::default())
    }

    pub fn from_config(config: ValidatorConfig) -> Result<Self> {
        let fetch_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout)
            .pool_max_idle_per_host(config.sitemap_concurrency)
            .build()?;

        let head_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.head_timeout)
            .pool_max_idle_per_host(config.url_concurrency)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()?;

        Ok(Self {
            fetch_client,
            head_client,
            config,
        })
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Crawl `root_url` with fresh gates. Returns once every spawned check has finished.
    pub async fn validate(&self, root_url: &str, log: &ResultLog) -> Result<()> {
        let gates = Gates::from_config(&self.config);
        self.validate_with_gates(root_url, log, &gates).await
    }

    /// Crawl using caller-owned gates, so their peaks can be inspected afterwards.
    ///
    /// Only result log failures are returned; HTTP and document problems become rows.
    pub async fn validate_with_gates(
        &self,
        root_url: &str,
        log: &ResultLog,
        gates: &Gates,
    ) -> Result<()> {
        info!(url = root_url, "Starting sitemap validation");

        let body = match self.fetch(root_url).await {
            Ok(body) => body,
            Err(failure) => {
                warn!(url = root_url, code = failure.status_code, "Root sitemap fetch failed: {}", failure.detail);
                return log
                    .append(&ValidationRow::error(root_url, failure.status_code, failure.detail))
                    .await;
            }
        };

        match parse_document(&body) {
            Ok(SitemapDocument::Index(index)) if !index.sitemaps.is_empty() => {
                log.append(&ValidationRow::ok(root_url, StatusCode::OK.as_u16())).await?;
                debug!(url = root_url, children = index.sitemaps.len(), "Root is a sitemap index");

                let mut handles = Vec::with_capacity(index.sitemaps.len());
                for child in index.sitemaps {
                    let permit = gates.sitemaps.acquire().await?;
                    let validator = self.clone();
                    let log = log.clone();
                    let gates = gates.clone();
                    handles.push(tokio::spawn(async move {
                        let _permit = permit;
                        validator.validate_child(&child.location, &log, &gates).await
                    }));
                }
                join_checks(handles).await
            }
            Ok(SitemapDocument::UrlSet(set)) if !set.urls.is_empty() => {
                log.append(&ValidationRow::ok(root_url, StatusCode::OK.as_u16())).await?;
                debug!(url = root_url, urls = set.urls.len(), "Root is a URL set");

                let locations = set.urls.into_iter().map(|u| u.location).collect();
                self.check_urls(locations, log, gates).await
            }
            _ => {
                warn!(url = root_url, "Root is neither a sitemap index nor a URL set");
                log.append(&ValidationRow::error(root_url, 0, INVALID_FORMAT)).await
            }
        }
    }

    async fn validate_child(&self, url: &str, log: &ResultLog, gates: &Gates) -> Result<()> {
        let body = match self.fetch(url).await {
            Ok(body) => body,
            Err(failure) => {
                return log
                    .append(&ValidationRow::error(url, failure.status_code, failure.detail))
                    .await;
            }
        };

        match parse_document(&body) {
            Ok(SitemapDocument::UrlSet(set)) => {
                log.append(&ValidationRow::ok(url, StatusCode::OK.as_u16())).await?;
                let locations = set.urls.into_iter().map(|u| u.location).collect();
                self.check_urls(locations, log, gates).await
            }
            Ok(SitemapDocument::Index(_)) => {
                log.append(&ValidationRow::error(
                    url,
                    0,
                    "Nested sitemap index is not followed",
                ))
                .await
            }
            Err(e) => {
                log.append(&ValidationRow::error(url, 0, format!("Invalid XML: {}", e)))
                    .await
            }
        }
    }

    /// Leaf-check every location under the URL gate and wait for all of them.
    async fn check_urls(&self, locations: Vec<String>, log: &ResultLog, gates: &Gates) -> Result<()> {
        let mut handles = Vec::with_capacity(locations.len());
        for location in locations {
            let permit = gates.urls.acquire().await?;
            let client = self.head_client.clone();
            let log = log.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let row = check_url(&client, &location).await;
                log.append(&row).await
            }));
        }
        join_checks(handles).await
    }

    async fn fetch(&self, url: &str) -> std::result::Result<String, FetchFailure> {
        let response = self
            .fetch_client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure {
                status_code: 0,
                detail: e.to_string(),
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchFailure {
                status_code: status.as_u16(),
                detail: format!("unexpected status code {}", status.as_u16()),
            });
        }

        response.text().await.map_err(|e| FetchFailure {
            status_code: status.as_u16(),
            detail: format!("failed to read body: {}", e),
        })
    }
}

/// HEAD one URL. OK iff the final status is 2xx; transport failures get status 0.
pub async fn check_url(client: &Client, url: &str) -> ValidationRow {
    match client.head(url).send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                ValidationRow::ok(url, status.as_u16())
            } else {
                ValidationRow::error(url, status.as_u16(), format!("status code {}", status.as_u16()))
            }
        }
        Err(e) => ValidationRow::error(url, 0, e.to_string()),
    }
}

/// Wait for every task, then report the first failure.
async fn join_checks(handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    let mut first_error: Option<ValidateError> = None;
    for handle in handles {
        let outcome = match handle.await {
            Ok(result) => result,
            Err(e) => Err(ValidateError::from(e)),
        };
        if let Err(e) = outcome
            && first_error.is_none()
        {
            first_error = Some(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
