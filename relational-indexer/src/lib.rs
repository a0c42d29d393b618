//! # Relational Indexer
//!
//! Entry point and configuration for loading a MySQL table, together with its
//! related rows, into an OpenSearch index.

pub mod config;
pub mod logging;

pub use config::{Cli, Config, Dependencies};

use thiserror::Error;

/// Errors that can occur during indexer initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] relational_indexer_pipeline::PipelineError),

    /// Source error.
    #[error("Source error: {0}")]
    SourceError(#[from] relational_indexer_repository::SourceError),

    /// Sink error.
    #[error("Sink error: {0}")]
    SinkError(#[from] relational_indexer_repository::SinkError),

    /// A source or the sink could not be reached or bound before the job started.
    #[error("Startup error: {0}")]
    StartupError(String),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Classify an error raised while building the job.
    ///
    /// Configuration errors keep their kind; everything else becomes a
    /// `StartupError`.
    pub fn during_startup(self) -> Self {
        match self {
            Self::ConfigError(_) | Self::StartupError(_) => self,
            other => Self::StartupError(other.to_string()),
        }
    }

    /// Process exit code for the error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) | Self::StartupError(_) => 2,
            Self::PipelineError(relational_indexer_pipeline::PipelineError::Cancelled) => 130,
            _ => 1,
        }
    }
}
