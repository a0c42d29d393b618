//! Sink error types.
//!
//! This module defines the error types that can occur while writing to the
//! search index.

use thiserror::Error;

/// Errors that can occur during search index operations.
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    /// Failed to establish connection to the search engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to create the search index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// Bulk operation had failures.
    #[error("Bulk operation error: {failed} of {total} documents failed: {reason}")]
    BulkOperationError {
        failed: usize,
        total: usize,
        reason: String,
    },

    /// Failed to update index settings.
    #[error("Settings error: {0}")]
    SettingsError(String),

    /// Failed to refresh the index.
    #[error("Refresh error: {0}")]
    RefreshError(String),
}

impl SinkError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a bulk operation error.
    pub fn bulk_operation(failed: usize, total: usize, reason: impl Into<String>) -> Self {
        Self::BulkOperationError {
            failed,
            total,
            reason: reason.into(),
        }
    }

    /// Create a settings error.
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::SettingsError(msg.into())
    }

    /// Create a refresh error.
    pub fn refresh(msg: impl Into<String>) -> Self {
        Self::RefreshError(msg.into())
    }
}
