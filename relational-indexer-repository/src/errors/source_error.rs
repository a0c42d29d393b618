//! Source error types.
//!
//! This module defines the error types that can occur while reading from the
//! relational source.

use thiserror::Error;

/// Errors that can occur during relational source operations.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Failed to establish a connection to the source.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// A query failed to execute.
    #[error("Query error: {0}")]
    QueryError(String),

    /// The table does not exist in the live schema.
    #[error("Table not found: {0}")]
    MissingTable(String),

    /// A column value could not be decoded.
    #[error("Decode error: {0}")]
    DecodeError(String),
}

impl SourceError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create a query error.
    pub fn query(msg: impl Into<String>) -> Self {
        Self::QueryError(msg.into())
    }

    /// Create a missing table error.
    pub fn missing_table(table: impl Into<String>) -> Self {
        Self::MissingTable(table.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::DecodeError(msg.into())
    }

    /// Whether the error reports a table absent from the live schema.
    pub fn is_missing_table(&self) -> bool {
        matches!(self, Self::MissingTable(_))
    }
}

/// SQLSTATE reported by MySQL for an unknown table.
const NO_SUCH_TABLE: &str = "42S02";

impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.code().as_deref() == Some(NO_SUCH_TABLE) => {
                Self::MissingTable(db.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => Self::ConnectionError(err.to_string()),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                Self::DecodeError(err.to_string())
            }
            _ => Self::QueryError(err.to_string()),
        }
    }
}
