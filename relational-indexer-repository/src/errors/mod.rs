//! Error types for the relational indexer repository.

mod sink_error;
mod source_error;

pub use sink_error::SinkError;
pub use source_error::SourceError;
