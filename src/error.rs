use chrono::NaiveDate;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BocmError>;

#[derive(Debug, Error)]
pub enum BocmError {
    /// No candidate URL answered for the date. Expected on weekends and holidays.
    #[error("no bulletin published for {date}")]
    NotFound { date: NaiveDate },

    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("knowledge base error: {0}")]
    Persistence(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}

impl From<std::io::Error> for BocmError {
    fn from(err: std::io::Error) -> Self {
        BocmError::Persistence(err.to_string())
    }
}

impl From<serde_json::Error> for BocmError {
    fn from(err: serde_json::Error) -> Self {
        BocmError::Persistence(err.to_string())
    }
}

impl From<rusqlite::Error> for BocmError {
    fn from(err: rusqlite::Error) -> Self {
        BocmError::Persistence(err.to_string())
    }
}
