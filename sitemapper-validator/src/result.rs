use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Ok => "OK",
            Outcome::Error => "ERROR",
        }
    }
}

/// One line of a job's result log.
///
/// `status_code` is 0 when no HTTP status applies (transport failures, bad documents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRow {
    #[serde(rename = "URL")]
    pub url: String,
    #[serde(rename = "Status")]
    pub outcome: Outcome,
    #[serde(rename = "StatusCode")]
    pub status_code: u16,
    #[serde(rename = "Error")]
    pub error: String,
}

impl ValidationRow {
    pub fn ok(url: impl Into<String>, status_code: u16) -> Self {
        Self {
            url: url.into(),
            outcome: Outcome::Ok,
            status_code,
            error: String::new(),
        }
    }

    pub fn error(url: impl Into<String>, status_code: u16, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outcome: Outcome::Error,
            status_code,
            error: error.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Ok
    }
}

/// Counters over the rows written to a log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub rows: usize,
    pub ok: usize,
    pub errors: usize,
}

impl LogSummary {
    pub fn record(&mut self, row: &ValidationRow) {
        self.rows += 1;
        match row.outcome {
            Outcome::Ok => self.ok += 1,
            Outcome::Error => self.errors += 1,
        }
    }
}
