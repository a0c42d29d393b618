//! # Relational Indexer Pipeline
//!
//! This crate moves the rows of a relational table into a search index,
//! folding each row and its related rows into one nested document.
//!
//! ## Architecture
//!
//! 1. **Cursor**: hands out batches of primary keys to the workers
//! 2. **Pool**: bounded set of source connections, each with a bound model
//! 3. **Assembler**: turns a row and its relationships into a document
//! 4. **Worker**: claims a batch, assembles its documents and submits them
//! 5. **Supervisor**: runs the workers and finalizes the sink

pub mod assembler;
pub mod cursor;
pub mod errors;
pub mod model;
pub mod pool;
pub mod progress;
pub mod supervisor;
pub mod worker;

pub use assembler::DocumentAssembler;
pub use cursor::{Claim, CursorConfig, PaginatingCursor, PrimaryKeyBatch};
pub use errors::PipelineError;
pub use model::BoundModel;
pub use pool::{ConnectionPool, PoolEntry, PooledEntry};
pub use progress::{ProgressIntervals, ProgressState, ProgressTick};
pub use supervisor::{JobReport, RunMode, StartDiscipline, Supervisor, SupervisorConfig};
pub use worker::{Worker, WorkerContext, WorkerState, WorkerSummary};
