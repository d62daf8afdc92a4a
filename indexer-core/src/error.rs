use thiserror::Error;

use crate::merkle::MerkleError;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Block not validated")]
    NotValidated,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{operation} failed: {source}")]
    RetriesExhausted {
        operation: String,
        #[source]
        source: Box<IndexerError>,
    },

    #[error("History drop failed")]
    HistoryDrop,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IndexerError {
    /// Wrap a terminal failure with the name of the operation that exhausted
    /// its retries.
    pub fn exhausted(operation: &str, source: IndexerError) -> Self {
        IndexerError::RetriesExhausted {
            operation: operation.to_string(),
            source: Box::new(source),
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexerError>;
