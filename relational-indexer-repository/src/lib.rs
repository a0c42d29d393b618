//! # Relational Indexer Repository
//!
//! This crate provides the traits and implementations the pipeline talks to:
//! the relational source the rows come from and the search sink the documents
//! go to. It includes error definitions, a MySQL source and an OpenSearch sink.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod mysql;
pub mod opensearch;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::SinkConfig;
pub use errors::{SinkError, SourceError};
pub use interfaces::{IndexSettings, RelationalSource, SearchSink};
pub use mysql::MySqlSource;
pub use opensearch::OpenSearchSink;
