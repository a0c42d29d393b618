//! Resolved configuration.

use std::env;


use super::cli::Cli;
use super::connections::{read_sink_nodes, read_source_connections, sink_node_from_url};
use super::profile::Profile;
use super::relationships::{default_relationship_spec, read_relationship_spec};
use crate::IndexingError;
use relational_indexer_pipeline::pool::{MAX_POOL_SIZE, MIN_POOL_SIZE};
use relational_indexer_pipeline::progress::{DEFAULT_REFRESH_EVERY, DEFAULT_REPORT_EVERY};
use relational_indexer_pipeline::supervisor::{MAX_WORKERS, MIN_WORKERS};
use relational_indexer_pipeline::ProgressIntervals;
use relational_indexer_shared::{
    IndexTarget, RelationshipSpec, Selection, SinkNode, SourceConnection,
};

/// Environment variable naming a single OpenSearch node.
const OPENSEARCH_URL: &str = "OPENSEARCH_URL";

/// Every setting of a run, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub verbosity: u8,
    pub development: bool,
    pub source_connections: Vec<SourceConnection>,
    pub pool_size: usize,
    pub sink_nodes: Vec<SinkNode>,
    pub target: IndexTarget,
    pub single_process: bool,
    pub workers: usize,
    pub eager: bool,
    pub read_chunk_size: usize,
    pub write_chunk_size: usize,
    /// `None` indexes every matching row.
    pub limit: Option<u64>,
    pub relationships: RelationshipSpec,
    pub selection: Selection,
    pub intervals: ProgressIntervals,
    pub tune_index: bool,
    pub json_logs: bool,
}

impl Config {
    /// Resolve the configuration from the command line and the environment.
    pub fn from_cli(cli: &Cli) -> Result<Self, IndexingError> {
        Self::resolve(cli, env::var(OPENSEARCH_URL).ok())
    }

    /// Resolve the configuration; `opensearch_url` is used when no node file is given.
    pub fn resolve(cli: &Cli, opensearch_url: Option<String>) -> Result<Self, IndexingError> {
        let profile = Profile::select(cli.development);
        let schema = cli.db_name.clone().unwrap_or(profile.schema);

        let source_connections = match cli.db_connections {
            Some(ref path) => read_source_connections(&schema, path)?,
            None => {
                let (host, user, secret) = profile.source_connection;
                vec![SourceConnection::new(schema.clone(), host, user, secret)]
            }
        };

        let sink_nodes = match (&cli.es_connections, opensearch_url) {
            (Some(path), _) => read_sink_nodes(path)?,
            (None, Some(url)) => vec![sink_node_from_url(&url)?],
            (None, None) => {
                let (scheme, host, port) = profile.sink_node;
                vec![SinkNode::new(scheme, host, port)]
            }
        };

        let relationships = match cli.relationships {
            Some(ref path) => read_relationship_spec(path)?,
            None => default_relationship_spec(),
        };

        let limit = match cli.limit {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => profile.limit,
        };

        let config = Self {
            verbosity: cli.verbose.max(profile.verbosity),
            development: cli.development,
            source_connections,
            pool_size: cli.db_queue_size.unwrap_or(profile.pool_size),
            sink_nodes,
            target: IndexTarget::new(
                cli.es_index.clone().unwrap_or(profile.index),
                cli.es_type.clone().unwrap_or(profile.doc_type),
            ),
            single_process: cli.single_process,
            workers: cli.threads.unwrap_or(profile.workers),
            eager: cli.eager,
            read_chunk_size: cli.read_buffer.unwrap_or(profile.read_chunk_size),
            write_chunk_size: cli.write_buffer.unwrap_or(profile.write_chunk_size),
            limit,
            relationships,
            selection: cli
                .selection
                .clone()
                .map(Selection::matching)
                .unwrap_or_default(),
            intervals: ProgressIntervals {
                report_every: cli.report_every.unwrap_or(DEFAULT_REPORT_EVERY),
                refresh_every: cli.refresh_every.unwrap_or(DEFAULT_REFRESH_EVERY),
            },
            tune_index: !cli.no_tuning,
            json_logs: cli.json_logs,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check numeric ranges and list contents.
    pub fn validate(&self) -> Result<(), IndexingError> {
        if !(MIN_POOL_SIZE..=MAX_POOL_SIZE).contains(&self.pool_size) {
            return Err(IndexingError::config(format!(
                "db queue size must be between {} and {}, got {}",
                MIN_POOL_SIZE, MAX_POOL_SIZE, self.pool_size
            )));
        }
        if !(MIN_WORKERS..=MAX_WORKERS).contains(&self.workers) {
            return Err(IndexingError::config(format!(
                "thread count must be between {} and {}, got {}",
                MIN_WORKERS, MAX_WORKERS, self.workers
            )));
        }
        if self.read_chunk_size == 0 || self.write_chunk_size == 0 {
            return Err(IndexingError::config("buffer sizes must be at least 1"));
        }
        if self.source_connections.is_empty() {
            return Err(IndexingError::config("no source connections configured"));
        }
        if self.sink_nodes.is_empty() {
            return Err(IndexingError::config("no sink nodes configured"));
        }
        Ok(())
    }
}
