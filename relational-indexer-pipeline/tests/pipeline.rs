//! End-to-end indexing jobs against the in-memory source and recording sink.

use std::collections::BTreeSet;
use std::sync::Arc;

use relational_indexer_pipeline::{
    BoundModel, ConnectionPool, CursorConfig, PaginatingCursor, PipelineError, PoolEntry,
    ProgressIntervals, RunMode, StartDiscipline, Supervisor, SupervisorConfig, WorkerState,
};
use relational_indexer_repository::test_utils::{MemorySource, RecordingSink};
use relational_indexer_repository::IndexSettings;
use relational_indexer_shared::{
    FieldValue, IndexTarget, PrimaryKey, Relation, RelationshipSpec, Row, Scalar,
};

// ── helpers ─────────────────────────────────────────────────────────────────

fn categories_spec() -> Arc<RelationshipSpec> {
    Arc::new(
        RelationshipSpec::new("categories")
            .with_relationship(
                "news_groups",
                Relation::OneToMany {
                    table: "news_groups".into(),
                    foreign_key: "category_id".into(),
                },
            )
            .with_relationship(
                "parent_category",
                Relation::SelfReferential {
                    foreign_key: "parent_id".into(),
                    backref: Some("child_categories".into()),
                },
            ),
    )
}

/// `rows` categories; each one after the first has the previous one as parent
/// modulo five, so chains stay short. Every category has one news group.
fn categories_source(rows: i64) -> MemorySource {
    let mut source = MemorySource::new()
        .with_table("categories", &["id", "title", "parent_id"])
        .with_table("news_groups", &["id", "category_id", "name"]);
    for id in 1..=rows {
        let parent = (id % 5 != 1).then(|| Scalar::Int(id - 1));
        source = source
            .with_row(
                Row::new("categories")
                    .with("id", Scalar::Int(id))
                    .with("title", Scalar::Text(format!("Category {}", id)))
                    .with("parent_id", parent),
            )
            .with_row(
                Row::new("news_groups")
                    .with("id", Scalar::Int(1000 + id))
                    .with("category_id", Scalar::Int(id))
                    .with("name", Scalar::Text(format!("group.{}", id))),
            );
    }
    source
}

struct Job {
    cursor: Arc<PaginatingCursor>,
    pool: Arc<ConnectionPool<PoolEntry>>,
    sink: Arc<RecordingSink>,
}

struct JobOptions {
    pool_size: usize,
    limit: Option<u64>,
    window: usize,
    intervals: ProgressIntervals,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            pool_size: 1,
            limit: None,
            window: 1000,
            intervals: ProgressIntervals::default(),
        }
    }
}

async fn job(source: MemorySource, sink: RecordingSink, options: JobOptions) -> Job {
    let source = Arc::new(source);
    let spec = categories_spec();

    let cursor = PaginatingCursor::new(
        source.clone(),
        CursorConfig::new("categories", "id")
            .with_limit(options.limit)
            .with_window(options.window)
            .with_intervals(options.intervals),
    )
    .await
    .unwrap();

    let pool = ConnectionPool::build(options.pool_size, &["memory"], |slot, label| {
        let source = source.clone();
        let spec = spec.clone();
        async move {
            let model = BoundModel::bind(source.as_ref(), spec).await?;
            Ok::<_, PipelineError>(PoolEntry {
                source,
                model,
                label: format!("{}-{}", label, slot),
            })
        }
    })
    .await
    .unwrap();

    Job {
        cursor: Arc::new(cursor),
        pool: Arc::new(pool),
        sink: Arc::new(sink),
    }
}

fn concurrent(workers: usize) -> RunMode {
    RunMode::Concurrent {
        workers,
        start: StartDiscipline::Eager,
    }
}

fn supervisor(job: &Job, mode: RunMode, read_chunk_size: usize) -> Supervisor {
    Supervisor::new(
        SupervisorConfig::new(mode, IndexTarget::new("dmoz", "category"))
            .with_read_chunk_size(read_chunk_size),
        job.cursor.clone(),
        job.pool.clone(),
        job.sink.clone(),
    )
    .unwrap()
}

fn indexed_ids(sink: &RecordingSink) -> Vec<PrimaryKey> {
    sink.indexed().into_iter().map(|doc| doc.id).collect()
}

// ── scenarios ───────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_twenty_five_rows_two_workers() {
    let job = job(
        categories_source(25),
        RecordingSink::new(10),
        JobOptions {
            intervals: ProgressIntervals {
                report_every: 10,
                refresh_every: 10,
            },
            ..JobOptions::default()
        },
    )
    .await;

    let report = supervisor(&job, concurrent(2), 10).run().await.unwrap();

    assert_eq!(job.cursor.batches_claimed().await, 3);
    assert_eq!(report.processed, 25);
    assert_eq!(report.total, 25);
    assert_eq!(job.sink.indexed().len(), 25);

    // Crossing 10 and 20, then the final refresh.
    assert_eq!(job.sink.refreshes().len(), 3);
    assert_eq!(job.sink.flushes(), 1);

    assert_eq!(report.workers.iter().map(|w| w.batches).sum::<u64>(), 3);
    assert!(report
        .workers
        .iter()
        .all(|worker| worker.state == WorkerState::Done));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_partition_the_keys() {
    let job = job(
        categories_source(200),
        RecordingSink::new(16),
        JobOptions {
            pool_size: 3,
            window: 16,
            ..JobOptions::default()
        },
    )
    .await;

    let report = supervisor(&job, concurrent(6), 3).run().await.unwrap();

    let ids = indexed_ids(&job.sink);
    let unique: BTreeSet<_> = ids.iter().cloned().collect();
    assert_eq!(ids.len(), 200);
    assert_eq!(unique.len(), 200);
    assert_eq!(
        unique.into_iter().collect::<Vec<_>>(),
        (1..=200).map(PrimaryKey::Int).collect::<Vec<_>>()
    );

    // One acquire per batch, every one of them released.
    assert_eq!(report.pool_acquires, job.cursor.batches_claimed().await);
    assert_eq!(report.pool_acquires, report.pool_releases);
    assert_eq!(job.pool.available(), 3);
}

#[tokio::test]
async fn test_limit_clamps_the_job() {
    let job = job(
        categories_source(100),
        RecordingSink::new(8),
        JobOptions {
            limit: Some(30),
            ..JobOptions::default()
        },
    )
    .await;

    let report = supervisor(&job, concurrent(3), 7).run().await.unwrap();

    assert_eq!(job.cursor.total(), 30);
    assert_eq!(report.processed, 30);
    assert_eq!(
        indexed_ids(&job.sink).into_iter().collect::<BTreeSet<_>>(),
        (1..=30).map(PrimaryKey::Int).collect::<BTreeSet<_>>()
    );
}

#[tokio::test]
async fn test_inline_mode_and_documents() {
    let job = job(categories_source(7), RecordingSink::new(100), JobOptions::default()).await;

    let report = supervisor(&job, RunMode::Inline, 4).run().await.unwrap();
    assert_eq!(report.workers.len(), 1);
    assert_eq!(report.processed, 7);

    let indexed = job.sink.indexed();
    let seventh = indexed
        .iter()
        .find(|doc| doc.id == PrimaryKey::Int(7))
        .map(|doc| &doc.document)
        .unwrap();

    // 7 -> 6 and stops at 6, whose parent is null.
    assert_eq!(seventh.list("parent_category").map(|items| items.len()), Some(1));
    assert_eq!(seventh.list("news_groups").map(|items| items.len()), Some(1));
    assert_eq!(seventh.get("parent_id"), Some(&FieldValue::Scalar(Scalar::Int(6))));
}

#[tokio::test]
async fn test_deferred_start_indexes_everything() {
    let job = job(categories_source(40), RecordingSink::new(5), JobOptions::default()).await;
    let mode = RunMode::Concurrent {
        workers: 4,
        start: StartDiscipline::Deferred,
    };

    let report = supervisor(&job, mode, 6).run().await.unwrap();
    assert_eq!(report.workers.len(), 4);
    assert_eq!(job.sink.indexed().len(), 40);
}

#[tokio::test]
async fn test_index_is_tuned_and_restored() {
    let job = job(categories_source(3), RecordingSink::new(10), JobOptions::default()).await;

    supervisor(&job, RunMode::Inline, 10).run().await.unwrap();

    let updates: Vec<IndexSettings> = job
        .sink
        .settings_updates()
        .into_iter()
        .map(|(_, settings)| settings)
        .collect();
    let expected: Vec<IndexSettings> = IndexSettings::bulk()
        .split()
        .into_iter()
        .chain(IndexSettings::interactive().split())
        .collect();
    assert_eq!(updates, expected);
    assert_eq!(job.sink.created_indexes(), vec!["dmoz".to_string()]);
}

#[tokio::test]
async fn test_rejected_settings_do_not_fail_the_job() {
    let job = job(
        categories_source(3),
        RecordingSink::new(10).rejecting_settings(),
        JobOptions::default(),
    )
    .await;

    let report = supervisor(&job, RunMode::Inline, 10).run().await.unwrap();
    assert_eq!(report.processed, 3);
}

#[tokio::test]
async fn test_refresh_interval_applies_when_merge_setting_is_rejected() {
    let job = job(
        categories_source(3),
        RecordingSink::new(10).rejecting_merge_settings(),
        JobOptions::default(),
    )
    .await;

    supervisor(&job, RunMode::Inline, 10).run().await.unwrap();

    let intervals: Vec<Option<String>> = job
        .sink
        .settings_updates()
        .into_iter()
        .map(|(_, settings)| settings.refresh_interval)
        .collect();
    assert_eq!(intervals, vec![Some("-1".to_string()), Some("1s".to_string())]);
}

#[tokio::test]
async fn test_cycle_fails_the_job() {
    let source = categories_source(10);
    // A category that is its own parent.
    source.insert(
        Row::new("categories")
            .with("id", Scalar::Int(11))
            .with("parent_id", Scalar::Int(11)),
    );

    let job = job(source, RecordingSink::new(10), JobOptions::default()).await;
    let err = supervisor(&job, concurrent(2), 4).run().await.unwrap_err();

    assert!(matches!(err, PipelineError::IntegrityError(_)));
    assert_eq!(job.pool.acquires(), job.pool.releases());
}

#[tokio::test]
async fn test_transient_failure_fails_the_job_but_flushes() {
    let job = job(
        categories_source(20),
        RecordingSink::new(100).failing_after(4),
        JobOptions::default(),
    )
    .await;

    let err = supervisor(&job, RunMode::Inline, 5).run().await.unwrap_err();

    assert!(matches!(err, PipelineError::SinkError(_)));
    assert_eq!(job.sink.flushes(), 1);
    assert_eq!(job.sink.indexed().len(), 4);
}

#[tokio::test]
async fn test_interrupt_aborts_without_finalizing() {
    let job = job(categories_source(10), RecordingSink::new(10), JobOptions::default()).await;
    let supervisor = supervisor(&job, concurrent(2), 5);

    // With the only connection held here, every worker waits on the pool.
    let held = job.pool.acquire().await.unwrap();
    let err = supervisor
        .run_until(std::future::ready(()))
        .await
        .unwrap_err();
    drop(held);

    assert!(matches!(err, PipelineError::Cancelled));
    assert_eq!(job.sink.flushes(), 0);
    assert!(job.sink.indexed().is_empty());
}

#[tokio::test]
async fn test_unknown_relation_table_fails_binding() {
    let source = Arc::new(MemorySource::new().with_table("categories", &["id", "parent_id"]));

    let err = BoundModel::bind(source.as_ref(), categories_spec())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ConnectorError(_)));
    assert!(err.stops_job());
}
