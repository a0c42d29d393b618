//! Supervisor: runs the workers of a job and finalizes the sink.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

use crate::assembler::DocumentAssembler;
use crate::cursor::PaginatingCursor;
use crate::errors::PipelineError;
use crate::pool::{ConnectionPool, PoolEntry};
use crate::worker::{Worker, WorkerContext, WorkerState, WorkerSummary};
use relational_indexer_repository::{IndexSettings, SearchSink};
use relational_indexer_shared::IndexTarget;

/// Smallest accepted worker count.
pub const MIN_WORKERS: usize = 1;

/// Largest accepted worker count.
pub const MAX_WORKERS: usize = 16;

/// When concurrent workers begin running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartDiscipline {
    /// Each worker starts as soon as it is created.
    Eager,
    /// All workers are created first, then started together.
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// One worker on the calling task.
    Inline,
    /// `workers` workers running in parallel.
    Concurrent {
        workers: usize,
        start: StartDiscipline,
    },
}

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub mode: RunMode,
    pub target: IndexTarget,
    /// Maximum number of keys per claimed batch.
    pub read_chunk_size: usize,
    /// Switch the index to bulk settings for the duration of the load.
    pub tune_index: bool,
}

impl SupervisorConfig {
    pub fn new(mode: RunMode, target: IndexTarget) -> Self {
        Self {
            mode,
            target,
            read_chunk_size: 1000,
            tune_index: true,
        }
    }

    pub fn with_read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    pub fn with_index_tuning(mut self, tune_index: bool) -> Self {
        self.tune_index = tune_index;
        self
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.read_chunk_size == 0 {
            return Err(PipelineError::config("read chunk size must be at least 1"));
        }
        if let RunMode::Concurrent { workers, .. } = self.mode {
            if !(MIN_WORKERS..=MAX_WORKERS).contains(&workers) {
                return Err(PipelineError::config(format!(
                    "worker count must be between {} and {}, got {}",
                    MIN_WORKERS, MAX_WORKERS, workers
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a completed job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub processed: u64,
    pub total: u64,
    pub elapsed: Duration,
    pub pool_acquires: u64,
    pub pool_releases: u64,
    pub workers: Vec<WorkerSummary>,
}

/// Summaries of the workers that finished, plus the first worker error.
type WorkerOutcome = (Vec<WorkerSummary>, Option<PipelineError>);

/// Owns the lifecycle of one indexing job.
pub struct Supervisor {
    config: SupervisorConfig,
    context: Arc<WorkerContext>,
}

impl Supervisor {
    pub fn new(
        config: SupervisorConfig,
        cursor: Arc<PaginatingCursor>,
        pool: Arc<ConnectionPool<PoolEntry>>,
        sink: Arc<dyn SearchSink>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let context = Arc::new(WorkerContext {
            cursor,
            pool,
            sink,
            assembler: Arc::new(DocumentAssembler::new()),
            target: config.target.clone(),
            read_chunk_size: config.read_chunk_size,
        });

        Ok(Self { config, context })
    }

    /// Run the job until it finishes or the process is interrupted.
    pub async fn run(&self) -> Result<JobReport, PipelineError> {
        self.run_until(shutdown_signal()).await
    }

    /// Run the job until it finishes or `interrupt` resolves.
    ///
    /// An interrupt aborts every worker at once; nothing is flushed afterwards.
    /// A worker error fails the job, but whatever the sink buffered is still
    /// flushed and refreshed.
    #[instrument(skip_all, fields(target = %self.config.target, mode = ?self.config.mode))]
    pub async fn run_until<F>(&self, interrupt: F) -> Result<JobReport, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        let sink = &self.context.sink;
        let index = &self.config.target.index;

        info!(total = self.context.cursor.total(), "Starting indexing job");

        sink.create_index_if_missing(index).await?;
        if self.config.tune_index {
            self.apply_settings(&IndexSettings::bulk()).await;
        }

        let outcome = match self.config.mode {
            RunMode::Inline => self.run_inline(interrupt).await,
            RunMode::Concurrent { workers, start } => {
                self.run_concurrent(workers, start, interrupt).await
            }
        };

        let (workers, failure) = match outcome {
            Err(PipelineError::Cancelled) => {
                warn!("Indexing job interrupted");
                return Err(PipelineError::Cancelled);
            }
            Err(e) => (Vec::new(), Some(e)),
            Ok(outcome) => outcome,
        };

        let finalized = self.finalize().await;
        if self.config.tune_index {
            self.apply_settings(&IndexSettings::interactive()).await;
        }

        let progress = self.context.cursor.progress().await;
        let report = JobReport {
            processed: progress.processed,
            total: progress.total,
            elapsed: started.elapsed(),
            pool_acquires: self.context.pool.acquires(),
            pool_releases: self.context.pool.releases(),
            workers,
        };

        info!(
            processed = report.processed,
            total = report.total,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Indexing job finished in {:.2}s",
            report.elapsed.as_secs_f64()
        );

        if let Some(e) = failure {
            error!(
                error = %e,
                processed = report.processed,
                total = report.total,
                "Indexing job failed"
            );
            return Err(e);
        }
        finalized?;
        Ok(report)
    }

    async fn run_inline<F>(&self, interrupt: F) -> Result<WorkerOutcome, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let worker = Worker::new(0, self.context.clone());

        tokio::select! {
            result = worker.run(shutdown_rx) => match result {
                Ok(summary) => Ok((vec![summary], None)),
                Err(e) => Ok((Vec::new(), Some(e))),
            },
            _ = interrupt => Err(PipelineError::Cancelled),
        }
    }

    async fn run_concurrent<F>(
        &self,
        count: usize,
        start: StartDiscipline,
        interrupt: F,
    ) -> Result<WorkerOutcome, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let (shutdown_tx, _) = broadcast::channel(1);
        let mut set = JoinSet::new();

        match start {
            StartDiscipline::Eager => {
                for id in 0..count {
                    let worker = Worker::new(id, self.context.clone());
                    set.spawn(worker.run(shutdown_tx.subscribe()));
                }
            }
            StartDiscipline::Deferred => {
                let workers: Vec<Worker> = (0..count)
                    .map(|id| Worker::new(id, self.context.clone()))
                    .collect();
                for worker in workers {
                    set.spawn(worker.run(shutdown_tx.subscribe()));
                }
            }
        }
        info!(workers = count, ?start, "Workers started");

        tokio::pin!(interrupt);
        let mut summaries = Vec::with_capacity(count);
        let mut failure: Option<PipelineError> = None;

        loop {
            tokio::select! {
                joined = set.join_next() => {
                    let result = match joined {
                        None => break,
                        Some(Ok(result)) => result,
                        Some(Err(e)) => Err(PipelineError::worker(e.to_string())),
                    };
                    match result {
                        Ok(summary) => summaries.push(summary),
                        Err(e) => {
                            if e.stops_job() {
                                warn!(error = %e, "Stopping all workers");
                                let _ = shutdown_tx.send(());
                            }
                            failure.get_or_insert(e);
                        }
                    }
                }
                _ = &mut interrupt => {
                    set.abort_all();
                    return Err(PipelineError::Cancelled);
                }
            }
        }

        let cancelled = summaries
            .iter()
            .filter(|summary| summary.state == WorkerState::Cancelled)
            .count();
        if cancelled > 0 {
            info!(cancelled, "Workers stopped before the cursor was exhausted");
        }

        Ok((summaries, failure))
    }

    async fn finalize(&self) -> Result<(), PipelineError> {
        let sink = &self.context.sink;
        sink.flush().await?;
        sink.refresh(&self.config.target.index).await?;
        Ok(())
    }

    /// Apply each setting in its own request; a rejected one is only logged.
    async fn apply_settings(&self, settings: &IndexSettings) {
        let index = &self.config.target.index;
        for part in settings.split() {
            if let Err(e) = self.context.sink.update_settings(index, &part).await {
                warn!(index = %index, settings = ?part, error = %e, "Failed to apply index settings");
            }
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_worker_range() {
        let target = IndexTarget::new("dmoz", "category");
        let mode = |workers| RunMode::Concurrent {
            workers,
            start: StartDiscipline::Eager,
        };

        assert!(SupervisorConfig::new(mode(16), target.clone()).validate().is_ok());
        assert!(SupervisorConfig::new(mode(17), target.clone()).validate().is_err());
        assert!(SupervisorConfig::new(mode(0), target.clone()).validate().is_err());
        assert!(SupervisorConfig::new(RunMode::Inline, target)
            .with_read_chunk_size(0)
            .validate()
            .is_err());
    }
}
