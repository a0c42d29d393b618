//! Worker loop: claim, fetch, assemble, submit, account.

use std::sync::Arc;

use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, instrument};

use crate::assembler::DocumentAssembler;
use crate::cursor::{Claim, PaginatingCursor, PrimaryKeyBatch};
use crate::errors::PipelineError;
use crate::pool::{ConnectionPool, PoolEntry};
use relational_indexer_repository::SearchSink;
use relational_indexer_shared::{Document, IndexTarget, PrimaryKey};

/// Resources shared by every worker of a job.
pub struct WorkerContext {
    pub cursor: Arc<PaginatingCursor>,
    pub pool: Arc<ConnectionPool<PoolEntry>>,
    pub sink: Arc<dyn SearchSink>,
    pub assembler: Arc<DocumentAssembler>,
    pub target: IndexTarget,
    /// Maximum number of keys claimed per batch.
    pub read_chunk_size: usize,
}

/// Where a worker is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    ClaimingBatch,
    Fetching,
    Submitting,
    /// The cursor is exhausted.
    Done,
    /// The job asked the worker to stop.
    Cancelled,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Done | WorkerState::Cancelled)
    }
}

/// What a worker did before reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub name: String,
    pub state: WorkerState,
    pub batches: u64,
    pub processed: u64,
    pub submitted: u64,
}

pub struct Worker {
    name: String,
    context: Arc<WorkerContext>,
    state: WorkerState,
    batches: u64,
    processed: u64,
    submitted: u64,
}

impl Worker {
    pub fn new(id: usize, context: Arc<WorkerContext>) -> Self {
        Self {
            name: format!("worker-{}", id),
            context,
            state: WorkerState::Idle,
            batches: 0,
            processed: 0,
            submitted: 0,
        }
    }

    /// Run until the cursor is exhausted or `shutdown` fires.
    ///
    /// The shutdown signal is checked between batches. Any error ends the loop
    /// and is returned as-is.
    #[instrument(skip_all, fields(worker = %self.name))]
    pub async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<WorkerSummary, PipelineError> {
        debug!("Worker started");

        loop {
            if !matches!(shutdown.try_recv(), Err(TryRecvError::Empty)) {
                info!(worker = %self.name, "Worker stopping on shutdown");
                self.state = WorkerState::Cancelled;
                break;
            }

            if let Err(e) = self.iterate().await {
                error!(worker = %self.name, state = ?self.state, error = %e, "Worker failed");
                return Err(e);
            }
            if self.state.is_terminal() {
                break;
            }
        }

        debug!(
            worker = %self.name,
            batches = self.batches,
            processed = self.processed,
            "Worker finished"
        );
        Ok(self.summary())
    }

    async fn iterate(&mut self) -> Result<(), PipelineError> {
        let context = self.context.clone();

        self.state = WorkerState::ClaimingBatch;
        let batch = match context.cursor.next_batch(context.read_chunk_size).await? {
            Claim::Batch(batch) => batch,
            Claim::Exhausted => {
                self.state = WorkerState::Done;
                return Ok(());
            }
        };

        self.state = WorkerState::Fetching;
        let documents = {
            let entry = context.pool.acquire().await?;
            debug!(
                worker = %self.name,
                batch = batch.sequence,
                connection = %entry.label,
                "Acquired source connection"
            );
            self.assemble_batch(&entry, &batch).await?
        };

        self.state = WorkerState::Submitting;
        for (id, document) in documents {
            context.sink.submit(&context.target, &id, document).await?;
            self.submitted += 1;
        }

        self.batches += 1;
        self.processed += batch.len() as u64;

        let tick = context.cursor.record_processed(batch.len() as u64).await;
        if tick.report {
            info!(
                worker = %self.name,
                processed = tick.processed,
                total = tick.total,
                elapsed_ms = tick.elapsed.as_millis() as u64,
                "Progress {:.1}% after {:.1}s",
                tick.percent(),
                tick.elapsed.as_secs_f64()
            );
        }
        if tick.refresh {
            debug!(index = %context.target.index, processed = tick.processed, "Refreshing index");
            context.sink.refresh(&context.target.index).await?;
        }

        self.state = WorkerState::Idle;
        Ok(())
    }

    async fn assemble_batch(
        &self,
        entry: &PoolEntry,
        batch: &PrimaryKeyBatch,
    ) -> Result<Vec<(PrimaryKey, Document)>, PipelineError> {
        let key_column = &entry.model.spec().primary_key;
        let rows = entry
            .model
            .fetch_primary(entry.source.as_ref(), &batch.keys)
            .await?;

        if rows.len() < batch.len() {
            debug!(
                worker = %self.name,
                batch = batch.sequence,
                missing = batch.len() - rows.len(),
                "Rows disappeared since their keys were paged"
            );
        }

        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let document = self
                .context
                .assembler
                .assemble(entry.source.as_ref(), &entry.model, &row)
                .await?;
            let id = row.key(key_column).ok_or_else(|| {
                PipelineError::integrity(format!(
                    "row of `{}` has no usable primary key",
                    row.table
                ))
            })?;
            documents.push((id, document));
        }

        Ok(documents)
    }

    fn summary(&self) -> WorkerSummary {
        WorkerSummary {
            name: self.name.clone(),
            state: self.state,
            batches: self.batches,
            processed: self.processed,
            submitted: self.submitted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorConfig;
    use crate::model::BoundModel;
    use relational_indexer_repository::test_utils::{MemorySource, RecordingSink};
    use relational_indexer_shared::{RelationshipSpec, Row, Scalar};

    async fn context(rows: i64, sink: Arc<RecordingSink>) -> Arc<WorkerContext> {
        let mut source = MemorySource::new().with_table("categories", &["id", "title"]);
        for id in 1..=rows {
            source = source.with_row(Row::new("categories").with("id", Scalar::Int(id)));
        }
        let source = Arc::new(source);
        let spec = Arc::new(RelationshipSpec::new("categories"));
        let model = BoundModel::bind(source.as_ref(), spec).await.unwrap();

        Arc::new(WorkerContext {
            cursor: Arc::new(
                PaginatingCursor::new(source.clone(), CursorConfig::new("categories", "id"))
                    .await
                    .unwrap(),
            ),
            pool: Arc::new(ConnectionPool::new(vec![PoolEntry {
                source,
                model,
                label: "memory".to_string(),
            }])),
            sink,
            assembler: Arc::new(DocumentAssembler::new()),
            target: IndexTarget::new("dmoz", "category"),
            read_chunk_size: 4,
        })
    }

    #[tokio::test]
    async fn test_worker_runs_until_done() {
        let sink = Arc::new(RecordingSink::new(100));
        let context = context(10, sink.clone()).await;
        let (_tx, rx) = broadcast::channel(1);

        let summary = Worker::new(0, context.clone()).run(rx).await.unwrap();

        assert_eq!(summary.state, WorkerState::Done);
        assert_eq!(summary.batches, 3);
        assert_eq!(summary.processed, 10);
        assert_eq!(sink.pending(), 10);
        assert_eq!(context.pool.acquires(), context.pool.releases());
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let sink = Arc::new(RecordingSink::new(100));
        let context = context(10, sink).await;
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let summary = Worker::new(1, context).run(rx).await.unwrap();
        assert_eq!(summary.state, WorkerState::Cancelled);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn test_sink_failure_ends_worker() {
        let sink = Arc::new(RecordingSink::new(100).failing_after(5));
        let context = context(10, sink).await;
        let (_tx, rx) = broadcast::channel(1);

        let err = Worker::new(0, context.clone()).run(rx).await.unwrap_err();
        assert!(matches!(err, PipelineError::SinkError(_)));
        assert!(!err.stops_job());
        assert_eq!(context.pool.acquires(), context.pool.releases());
    }
}
