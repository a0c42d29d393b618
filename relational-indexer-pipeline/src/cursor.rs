//! Shared cursor handing out batches of primary keys.
//!
//! The cursor pages through the primary keys of the driving table with keyset
//! pagination (`key > last_key ORDER BY key LIMIT window`) and hands them out
//! in batches. Every worker draws from the same cursor; a single lock
//! serializes the draws so that no key is ever handed out twice.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::errors::PipelineError;
use crate::progress::{ProgressIntervals, ProgressState, ProgressTick};
use relational_indexer_repository::RelationalSource;
use relational_indexer_shared::{PrimaryKey, Selection};

/// Default number of keys fetched from the source per window.
pub const DEFAULT_KEY_WINDOW: usize = 1000;

/// Configuration for the paginating cursor.
#[derive(Debug, Clone)]
pub struct CursorConfig {
    /// Table whose primary keys are paged through.
    pub table: String,
    /// Primary-key column of `table`.
    pub key_column: String,
    /// Rows to include.
    pub selection: Selection,
    /// Maximum number of keys handed out; `None` or `Some(0)` is unbounded.
    pub limit: Option<u64>,
    /// Number of keys loaded from the source per refill.
    pub window: usize,
    pub intervals: ProgressIntervals,
}

impl CursorConfig {
    pub fn new(table: impl Into<String>, key_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            key_column: key_column.into(),
            selection: Selection::all(),
            limit: None,
            window: DEFAULT_KEY_WINDOW,
            intervals: ProgressIntervals::default(),
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit.filter(|limit| *limit > 0);
        self
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn with_intervals(mut self, intervals: ProgressIntervals) -> Self {
        self.intervals = intervals;
        self
    }
}

/// A batch of primary keys claimed by one worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyBatch {
    /// Position of the batch in claim order, starting at zero.
    pub sequence: u64,
    pub keys: Vec<PrimaryKey>,
}

impl PrimaryKeyBatch {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Result of a claim on the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Batch(PrimaryKeyBatch),
    Exhausted,
}

#[derive(Debug)]
struct CursorState {
    window: VecDeque<PrimaryKey>,
    last_key: Option<PrimaryKey>,
    drawn: u64,
    source_drained: bool,
    batches: u64,
    /// Set by the first claim.
    started: Option<Instant>,
    progress: ProgressState,
}

/// Paginating cursor over the primary keys matching a selection.
pub struct PaginatingCursor {
    source: Arc<dyn RelationalSource>,
    config: CursorConfig,
    total: u64,
    state: Mutex<CursorState>,
}

impl PaginatingCursor {
    /// Create a cursor, counting the matching rows once.
    ///
    /// # Returns
    ///
    /// * `Ok(PaginatingCursor)` - Cursor positioned before the first key
    /// * `Err(PipelineError)` - If the count query fails
    #[instrument(skip(source, config), fields(table = %config.table))]
    pub async fn new(
        source: Arc<dyn RelationalSource>,
        config: CursorConfig,
    ) -> Result<Self, PipelineError> {
        let matching = source.count(&config.table, &config.selection).await?;
        let total = match config.limit {
            Some(limit) if limit > 0 => matching.min(limit),
            _ => matching,
        };

        info!(matching, total, limit = ?config.limit, "Cursor ready");

        Ok(Self {
            source,
            total,
            state: Mutex::new(CursorState {
                window: VecDeque::new(),
                last_key: None,
                drawn: 0,
                source_drained: false,
                batches: 0,
                started: None,
                progress: ProgressState::new(total),
            }),
            config,
        })
    }

    /// Number of keys the cursor will hand out, computed at construction.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Claim the next batch of at most `chunk_size` keys.
    ///
    /// A partial batch is returned when the keys run out mid-draw; the next
    /// claim then reports `Exhausted`, as does every claim after it.
    pub async fn next_batch(&self, chunk_size: usize) -> Result<Claim, PipelineError> {
        let chunk_size = chunk_size.max(1);
        let mut state = self.state.lock().await;
        state.started.get_or_insert_with(Instant::now);

        if state.progress.exhausted {
            return Ok(Claim::Exhausted);
        }

        let mut keys = Vec::with_capacity(chunk_size.min(self.config.window));
        while keys.len() < chunk_size {
            if self.remaining(&state) == Some(0) {
                break;
            }
            if let Some(key) = state.window.pop_front() {
                state.drawn += 1;
                keys.push(key);
                continue;
            }
            if state.source_drained {
                break;
            }
            if let Err(e) = self.refill(&mut state).await {
                // Keys already drawn stay claimable.
                state.drawn -= keys.len() as u64;
                for key in keys.into_iter().rev() {
                    state.window.push_front(key);
                }
                return Err(e);
            }
        }

        if keys.len() < chunk_size {
            state.progress.exhausted = true;
            debug!(drawn = state.drawn, "Cursor exhausted");
        }
        if keys.is_empty() {
            return Ok(Claim::Exhausted);
        }

        let sequence = state.batches;
        state.batches += 1;
        Ok(Claim::Batch(PrimaryKeyBatch { sequence, keys }))
    }

    /// Record `count` processed documents.
    pub async fn record_processed(&self, count: u64) -> ProgressTick {
        let mut state = self.state.lock().await;
        let elapsed = state
            .started
            .map(|started| started.elapsed())
            .unwrap_or_default();
        state.progress.advance(count, &self.config.intervals, elapsed)
    }

    /// Snapshot of the job-wide progress.
    pub async fn progress(&self) -> ProgressState {
        self.state.lock().await.progress
    }

    /// Number of batches handed out so far.
    pub async fn batches_claimed(&self) -> u64 {
        self.state.lock().await.batches
    }

    fn remaining(&self, state: &CursorState) -> Option<u64> {
        self.config
            .limit
            .map(|limit| limit.saturating_sub(state.drawn))
    }

    async fn refill(&self, state: &mut CursorState) -> Result<(), PipelineError> {
        let window = match self.remaining(state) {
            Some(remaining) => (remaining.min(self.config.window as u64)) as usize,
            None => self.config.window,
        };

        let keys = self
            .source
            .select_keys(
                &self.config.table,
                &self.config.key_column,
                &self.config.selection,
                state.last_key.as_ref(),
                window,
            )
            .await?;

        debug!(fetched = keys.len(), after = ?state.last_key, "Refilled key window");

        if keys.len() < window {
            state.source_drained = true;
        }
        if let Some(last) = keys.last() {
            state.last_key = Some(last.clone());
        }
        state.window.extend(keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relational_indexer_repository::test_utils::MemorySource;
    use relational_indexer_shared::{Row, Scalar};

    fn source(rows: i64) -> Arc<MemorySource> {
        let mut source = MemorySource::new().with_table("categories", &["id", "title"]);
        for id in 1..=rows {
            source = source.with_row(
                Row::new("categories")
                    .with("id", Scalar::Int(id))
                    .with("title", Scalar::Text(format!("Category {}", id))),
            );
        }
        Arc::new(source)
    }

    async fn drain(cursor: &PaginatingCursor, chunk_size: usize) -> Vec<usize> {
        let mut sizes = Vec::new();
        while let Claim::Batch(batch) = cursor.next_batch(chunk_size).await.unwrap() {
            sizes.push(batch.len());
        }
        sizes
    }

    #[tokio::test]
    async fn test_partial_batch_then_exhausted() {
        let cursor = PaginatingCursor::new(
            source(25),
            CursorConfig::new("categories", "id").with_window(7),
        )
        .await
        .unwrap();

        assert_eq!(cursor.total(), 25);
        assert_eq!(drain(&cursor, 10).await, vec![10, 10, 5]);
        assert_eq!(cursor.next_batch(10).await.unwrap(), Claim::Exhausted);
        assert!(cursor.progress().await.exhausted);
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_exhausted() {
        let cursor = PaginatingCursor::new(source(20), CursorConfig::new("categories", "id"))
            .await
            .unwrap();

        assert_eq!(drain(&cursor, 10).await, vec![10, 10]);
        assert_eq!(cursor.batches_claimed().await, 2);
    }

    #[tokio::test]
    async fn test_limit_clamps_total_and_keys() {
        let cursor = PaginatingCursor::new(
            source(100),
            CursorConfig::new("categories", "id").with_limit(Some(30)),
        )
        .await
        .unwrap();

        assert_eq!(cursor.total(), 30);
        assert_eq!(drain(&cursor, 7).await.iter().sum::<usize>(), 30);
    }

    #[tokio::test]
    async fn test_zero_limit_is_unbounded() {
        let cursor = PaginatingCursor::new(
            source(12),
            CursorConfig::new("categories", "id").with_limit(Some(0)),
        )
        .await
        .unwrap();

        assert_eq!(cursor.total(), 12);
        assert_eq!(drain(&cursor, 5).await, vec![5, 5, 2]);
    }

    #[tokio::test]
    async fn test_failed_count_fails_construction() {
        let source = Arc::new(MemorySource::new().failing_count());
        let result = PaginatingCursor::new(source, CursorConfig::new("categories", "id")).await;
        assert!(matches!(result, Err(PipelineError::SourceError(_))));
    }

    #[tokio::test]
    async fn test_failed_refill_loses_no_keys() {
        let mut source = MemorySource::new().with_table("categories", &["id"]);
        for id in 1..=25 {
            source = source.with_row(Row::new("categories").with("id", Scalar::Int(id)));
        }
        // The third window fails once.
        let source = Arc::new(source.failing_select_after(2));
        let cursor = PaginatingCursor::new(
            source.clone(),
            CursorConfig::new("categories", "id")
                .with_window(4)
                .with_limit(Some(20)),
        )
        .await
        .unwrap();

        let err = cursor.next_batch(10).await.unwrap_err();
        assert!(matches!(err, PipelineError::SourceError(_)));
        assert_eq!(cursor.batches_claimed().await, 0);
        assert!(!cursor.progress().await.exhausted);

        let mut keys = Vec::new();
        while let Claim::Batch(batch) = cursor.next_batch(10).await.unwrap() {
            keys.extend(batch.keys);
        }

        let expected: Vec<PrimaryKey> = (1..=20).map(PrimaryKey::Int).collect();
        assert_eq!(keys, expected);
        assert_eq!(cursor.total(), 20);
        assert_eq!(cursor.batches_claimed().await, 2);
        assert_eq!(cursor.next_batch(10).await.unwrap(), Claim::Exhausted);
    }

    #[tokio::test]
    async fn test_keys_are_handed_out_in_order() {
        let cursor = PaginatingCursor::new(
            source(9),
            CursorConfig::new("categories", "id").with_window(4),
        )
        .await
        .unwrap();

        let mut keys = Vec::new();
        while let Claim::Batch(batch) = cursor.next_batch(3).await.unwrap() {
            keys.extend(batch.keys);
        }
        let expected: Vec<PrimaryKey> = (1..=9).map(PrimaryKey::Int).collect();
        assert_eq!(keys, expected);
    }

    #[tokio::test]
    async fn test_record_processed_ticks() {
        let cursor = PaginatingCursor::new(
            source(25),
            CursorConfig::new("categories", "id").with_intervals(ProgressIntervals {
                report_every: 10,
                refresh_every: 10,
            }),
        )
        .await
        .unwrap();

        assert!(cursor.record_processed(10).await.refresh);
        assert!(!cursor.record_processed(5).await.refresh);
        assert_eq!(cursor.progress().await.processed, 15);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_carry_time_since_first_claim() {
        let cursor = PaginatingCursor::new(source(5), CursorConfig::new("categories", "id"))
            .await
            .unwrap();

        tokio::time::advance(std::time::Duration::from_secs(60)).await;
        assert!(matches!(cursor.next_batch(5).await.unwrap(), Claim::Batch(_)));
        tokio::time::advance(std::time::Duration::from_secs(3)).await;

        let tick = cursor.record_processed(5).await;
        assert_eq!(tick.elapsed, std::time::Duration::from_secs(3));
    }
}
