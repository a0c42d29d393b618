//! Dependency initialization and wiring for the relational indexer.

use std::sync::Arc;

use tracing::info;

use super::settings::Config;
use crate::IndexingError;
use relational_indexer_pipeline::{
    BoundModel, ConnectionPool, CursorConfig, PaginatingCursor, PipelineError, PoolEntry,
    RunMode, StartDiscipline, Supervisor, SupervisorConfig,
};
use relational_indexer_repository::{MySqlSource, OpenSearchSink, SearchSink, SinkConfig};

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured supervisor ready to run.
    pub supervisor: Supervisor,
}

impl Dependencies {
    /// Connect to the sink and the sources and build the job.
    ///
    /// The cursor gets its own connection to the first configured source; the
    /// pool entries rotate through every configured source.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(IndexingError)` - If a connection, the row count or the schema
    ///   binding fails; such failures are `ConfigError` or `StartupError`
    pub async fn new(config: &Config) -> Result<Self, IndexingError> {
        Self::build(config).await.map_err(IndexingError::during_startup)
    }

    async fn build(config: &Config) -> Result<Self, IndexingError> {
        info!(
            nodes = config.sink_nodes.len(),
            sources = config.source_connections.len(),
            target = %config.target,
            "Initializing dependencies"
        );

        let sink = OpenSearchSink::new(
            &config.sink_nodes,
            SinkConfig::with_write_chunk_size(config.write_chunk_size),
        )?;

        let healthy = sink
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let spec = Arc::new(config.relationships.clone());
        let primary = config
            .source_connections
            .first()
            .ok_or_else(|| IndexingError::config("no source connections configured"))?;

        let cursor_source = Arc::new(MySqlSource::connect(primary).await?);
        let cursor = PaginatingCursor::new(
            cursor_source,
            CursorConfig::new(spec.primary_table.clone(), spec.primary_key.clone())
                .with_selection(config.selection.clone())
                .with_limit(config.limit)
                .with_intervals(config.intervals),
        )
        .await?;

        let pool_size = if config.single_process {
            1
        } else {
            config.pool_size
        };
        let pool = ConnectionPool::build(
            pool_size,
            &config.source_connections,
            |slot, connection| {
                let spec = spec.clone();
                async move {
                    let source = MySqlSource::connect(&connection).await?;
                    let model = BoundModel::bind(&source, spec).await?;
                    info!(slot, connection = %connection, "Pool entry bound");
                    Ok::<_, PipelineError>(PoolEntry {
                        source: Arc::new(source),
                        model,
                        label: connection.to_string(),
                    })
                }
            },
        )
        .await?;

        let mode = if config.single_process {
            RunMode::Inline
        } else {
            RunMode::Concurrent {
                workers: config.workers,
                start: if config.eager {
                    StartDiscipline::Eager
                } else {
                    StartDiscipline::Deferred
                },
            }
        };

        let supervisor = Supervisor::new(
            SupervisorConfig::new(mode, config.target.clone())
                .with_read_chunk_size(config.read_chunk_size)
                .with_index_tuning(config.tune_index),
            Arc::new(cursor),
            Arc::new(pool),
            Arc::new(sink),
        )?;

        Ok(Self { supervisor })
    }
}
