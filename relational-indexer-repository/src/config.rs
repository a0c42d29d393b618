//! Configuration types for the search sink.

/// Default number of documents per bulk request.
pub const DEFAULT_WRITE_CHUNK_SIZE: usize = 1000;

/// Configuration for the search sink.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Number of buffered documents that triggers a bulk request.
    pub write_chunk_size: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
        }
    }
}

impl SinkConfig {
    /// Create a config with a custom write chunk size.
    ///
    /// A size of zero is treated as one.
    pub fn with_write_chunk_size(write_chunk_size: usize) -> Self {
        Self {
            write_chunk_size: write_chunk_size.max(1),
        }
    }
}
