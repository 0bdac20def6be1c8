// Append-only CSV result log shared by all tasks of a job

use crate::error::Result;
use crate::result::{LogSummary, ValidationRow};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

pub const HEADER: [&str; 4] = ["URL", "Status", "StatusCode", "Error"];

struct LogWriter {
    writer: csv::Writer<File>,
    summary: LogSummary,
}

#[derive(Clone)]
pub struct ResultLog {
    inner: Arc<Mutex<LogWriter>>,
    path: PathBuf,
}

impl ResultLog {
    /// Take over a freshly created file and write the header row.
    pub fn from_new_file(file: File, path: impl Into<PathBuf>) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        writer.write_record(HEADER)?;
        writer.flush()?;

        Ok(Self {
            inner: Arc::new(Mutex::new(LogWriter {
                writer,
                summary: LogSummary::default(),
            })),
            path: path.into(),
        })
    }

    /// Create (or truncate) `path` and write the header row.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::from_new_file(file, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row and flush it before releasing the lock.
    ///
    /// The write runs on the blocking pool so file I/O never stalls a runtime worker.
    pub async fn append(&self, row: &ValidationRow) -> Result<()> {
        let inner = self.inner.clone();
        let owned = row.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut inner = lock(&inner);
            inner.writer.serialize(&owned)?;
            inner.writer.flush()?;
            inner.summary.record(&owned);
            Ok(())
        })
        .await??;

        debug!(url = %row.url, status = row.outcome.as_str(), code = row.status_code, "Recorded result");
        Ok(())
    }

    pub fn summary(&self) -> LogSummary {
        lock(&self.inner).summary
    }
}

// A panic mid-append leaves at most a partial line; the writer itself stays usable
fn lock(inner: &Mutex<LogWriter>) -> MutexGuard<'_, LogWriter> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Parse a result log back into rows.
pub fn parse_rows(bytes: &[u8]) -> Result<Vec<ValidationRow>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let rows = reader
        .deserialize()
        .collect::<std::result::Result<Vec<ValidationRow>, _>>()?;
    Ok(rows)
}
