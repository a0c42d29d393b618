//! In-memory doubles for the source and the sink.
//!
//! Compiled for tests and under the `test-utils` feature so downstream crates
//! can drive the pipeline without MySQL or OpenSearch.

mod memory_source;
mod recording_sink;

pub use memory_source::MemorySource;
pub use recording_sink::{RecordingSink, SubmittedDocument};
