//! OpenSearch implementation of the search sink.
//!
//! This module provides a concrete implementation of `SearchSink`
//! using OpenSearch as the backend.

mod buffer;
mod index_config;
mod sink;

pub use index_config::get_index_settings;
pub use sink::OpenSearchSink;
