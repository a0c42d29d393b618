//! Error types for the relational indexer pipeline.

use relational_indexer_repository::{SinkError, SourceError};
use thiserror::Error;

/// Errors that can occur while running the indexing pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Error from the relational source.
    #[error("Source error: {0}")]
    SourceError(#[from] SourceError),

    /// Error from the search sink.
    #[error("Sink error: {0}")]
    SinkError(#[from] SinkError),

    /// A configured relation or table does not resolve against the live schema.
    #[error("Connector error: {0}")]
    ConnectorError(String),

    /// The source data violates an assumption the documents rely on.
    #[error("Data integrity error: {0}")]
    IntegrityError(String),

    /// Invalid pipeline configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A worker task panicked or could not be joined.
    #[error("Worker error: {0}")]
    WorkerError(String),

    /// The job was interrupted.
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a connector error.
    pub fn connector(msg: impl Into<String>) -> Self {
        Self::ConnectorError(msg.into())
    }

    /// Create a data integrity error.
    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::IntegrityError(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a worker error.
    pub fn worker(msg: impl Into<String>) -> Self {
        Self::WorkerError(msg.into())
    }

    /// Whether the error must stop every worker, not only the one that hit it.
    pub fn stops_job(&self) -> bool {
        matches!(
            self,
            Self::IntegrityError(_) | Self::ConnectorError(_) | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stops_job() {
        assert!(PipelineError::integrity("cycle").stops_job());
        assert!(PipelineError::connector("no table").stops_job());
        assert!(!PipelineError::from(SourceError::query("timeout")).stops_job());
        assert!(!PipelineError::from(SinkError::connection("refused")).stops_job());
    }
}
