use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidateError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation job not found: {0}")]
    JobNotFound(String),

    #[error("Result log error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Job status error: {0}")]
    StatusError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    #[error("Other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ValidateError>;
