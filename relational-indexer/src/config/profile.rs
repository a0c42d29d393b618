//! Built-in defaults for production and development runs.

use relational_indexer_repository::config::DEFAULT_WRITE_CHUNK_SIZE;

/// Defaults applied before command-line options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    pub verbosity: u8,
    pub schema: String,
    /// `(host, user, secret)` used when no connection file is given.
    pub source_connection: (String, String, String),
    pub pool_size: usize,
    /// `(scheme, host, port)` used when no node file or URL is given.
    pub sink_node: (String, String, u16),
    pub index: String,
    pub doc_type: String,
    pub workers: usize,
    pub read_chunk_size: usize,
    pub write_chunk_size: usize,
    pub limit: Option<u64>,
}

impl Profile {
    pub fn production() -> Self {
        Self {
            verbosity: 0,
            schema: "dmoz".to_string(),
            source_connection: (
                "127.0.0.1".to_string(),
                "indexer".to_string(),
                String::new(),
            ),
            pool_size: 4,
            sink_node: ("http".to_string(), "127.0.0.1".to_string(), 9200),
            index: "dmoz_categories".to_string(),
            doc_type: "category".to_string(),
            workers: 16,
            read_chunk_size: 100,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
            limit: None,
        }
    }

    pub fn development() -> Self {
        Self {
            verbosity: 3,
            limit: Some(2000),
            ..Self::production()
        }
    }

    pub fn select(development: bool) -> Self {
        if development {
            Self::development()
        } else {
            Self::production()
        }
    }
}
