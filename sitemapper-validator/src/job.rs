//! Validation jobs on disk.
//!
//! Each job owns two files in the results directory:
//!
//! - `validation_<unix-millis>.csv`: the append-only result log
//! - `validation_<unix-millis>.status.json`: the job's lifecycle state
//!
//! Results can be read at any time while the crawl is still appending.

use crate::error::{Result, ValidateError};
use crate::log::ResultLog;
use crate::result::LogSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const JOB_PREFIX: &str = "validation_";

/// How many ids to try when jobs are created within the same millisecond.
const MAX_ID_ATTEMPTS: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// Persisted lifecycle of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub root_url: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: LogSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A created job with its log open for appending.
pub struct Job {
    pub state: JobState,
    pub log: ResultLog,
}

impl Job {
    pub fn id(&self) -> &str {
        &self.state.job_id
    }
}

#[derive(Debug, Clone)]
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Job ids are generated here, so anything that could escape the directory is unknown.
    fn checked_id(job_id: &str) -> Result<&str> {
        let valid = job_id.starts_with(JOB_PREFIX)
            && job_id.len() > JOB_PREFIX.len()
            && job_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if valid {
            Ok(job_id)
        } else {
            Err(ValidateError::JobNotFound(job_id.to_string()))
        }
    }

    pub fn results_path(&self, job_id: &str) -> Result<PathBuf> {
        let id = Self::checked_id(job_id)?;
        Ok(self.dir.join(format!("{}.csv", id)))
    }

    fn status_path(&self, job_id: &str) -> Result<PathBuf> {
        let id = Self::checked_id(job_id)?;
        Ok(self.dir.join(format!("{}.status.json", id)))
    }

    /// Create a pending job: a results log holding only the header row plus its status file.
    pub async fn create(&self, root_url: &str) -> Result<Job> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let millis = Utc::now().timestamp_millis();
        for attempt in 0..MAX_ID_ATTEMPTS {
            let job_id = format!("{}{}", JOB_PREFIX, millis + attempt);
            let path = self.results_path(&job_id)?;

            let file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!(job_id = %job_id, "Job id taken, trying the next one");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let log = ResultLog::from_new_file(file, &path)?;
            let now = Utc::now();
            let state = JobState {
                job_id,
                root_url: root_url.to_string(),
                status: JobStatus::Pending,
                created_at: now,
                updated_at: now,
                summary: LogSummary::default(),
                error: None,
            };
            self.write_status(&state).await?;

            info!(job_id = %state.job_id, root_url, "Created validation job");
            return Ok(Job { state, log });
        }

        Err(ValidateError::Other(format!(
            "could not allocate a job id in {}",
            self.dir.display()
        )))
    }

    /// Replace the status file. Written to a temp file first so readers never see half a document.
    pub async fn write_status(&self, state: &JobState) -> Result<()> {
        let path = self.status_path(&state.job_id)?;
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn status(&self, job_id: &str) -> Result<JobState> {
        let path = self.status_path(job_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ValidateError::JobNotFound(job_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Everything logged so far for a job.
    pub async fn read_results(&self, job_id: &str) -> Result<Vec<u8>> {
        let path = self.results_path(job_id)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(ValidateError::JobNotFound(job_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_new_job_has_header_and_pending_status() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::new(temp_dir.path().join("validations"));

        let job = store.create("https://example.com/sitemap.xml").await.unwrap();
        assert!(job.id().starts_with("validation_"));

        let results = store.read_results(job.id()).await.unwrap();
        assert_eq!(results, b"URL,Status,StatusCode,Error\n");

        let state = store.status(job.id()).await.unwrap();
        assert_eq!(state.status, JobStatus::Pending);
        assert_eq!(state.root_url, "https://example.com/sitemap.xml");
    }

    #[tokio::test]
    async fn test_ids_are_unique_within_a_millisecond() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::new(temp_dir.path());

        let mut ids = std::collections::HashSet::new();
        for _ in 0..5 {
            let job = store.create("https://example.com/").await.unwrap();
            assert!(ids.insert(job.id().to_string()));
        }
    }

    #[tokio::test]
    async fn test_unknown_and_malformed_ids() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::new(temp_dir.path());

        for id in ["validation_1", "../etc/passwd", "validation_../x", "", "other_1"] {
            assert!(
                matches!(store.read_results(id).await, Err(ValidateError::JobNotFound(_))),
                "{} should be not found",
                id
            );
            assert!(matches!(store.status(id).await, Err(ValidateError::JobNotFound(_))));
        }
    }

    #[tokio::test]
    async fn test_status_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JobStore::new(temp_dir.path());
        let job = store.create("https://example.com/").await.unwrap();

        let mut state = job.state.clone();
        state.status = JobStatus::Failed;
        state.error = Some("log write failed".to_string());
        store.write_status(&state).await.unwrap();

        let loaded = store.status(job.id()).await.unwrap();
        assert_eq!(loaded, state);
        assert!(loaded.status.is_finished());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&JobStatus::Succeeded).unwrap(), "\"succeeded\"");
        assert_eq!(JobStatus::Running.as_str(), "running");
    }
}
