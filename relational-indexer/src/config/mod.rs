//! Configuration for the relational indexer.

mod cli;
mod connections;
mod dependencies;
mod profile;
mod relationships;
mod settings;

pub use cli::Cli;
pub use connections::{parse_sink_nodes, parse_source_connections, sink_node_from_url};
pub use dependencies::Dependencies;
pub use profile::Profile;
pub use relationships::default_relationship_spec;
pub use settings::Config;
