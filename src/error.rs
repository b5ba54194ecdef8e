use thiserror::Error;

/// Listing vehicles (catalog level) or groups (vehicle level) failed.
#[derive(Debug, Error)]
#[error("discovery failed for {target}: {message}")]
pub struct DiscoveryError {
    pub target: String,
    pub message: String,
}

impl DiscoveryError {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// A single group's rows or page could not be extracted.
#[derive(Debug, Error)]
#[error("extraction failed: {message}")]
pub struct ExtractionError {
    pub message: String,
}

impl ExtractionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A write to the store or an output shard failed.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("shard: {0}")]
    Shard(String),
}

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Why one work unit ended in `error`.
#[derive(Debug, Error)]
pub enum GroupError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}
