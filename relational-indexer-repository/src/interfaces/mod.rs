//! Interface definitions for the relational source and the search sink.
//!
//! Both sides are traits so the pipeline can run against MySQL and OpenSearch
//! in production and against in-memory doubles in tests.

mod relational_source;
mod search_sink;

pub use relational_source::RelationalSource;
pub use search_sink::{IndexSettings, SearchSink};
