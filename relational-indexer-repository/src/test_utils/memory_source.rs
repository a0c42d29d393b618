//! In-memory relational source.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::SourceError;
use crate::interfaces::RelationalSource;
use relational_indexer_shared::{PrimaryKey, Row, Scalar, Secondary, Selection};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Row>,
}

/// Relational source backed by in-memory tables.
///
/// Only `Selection::all()` is supported. Tables can be dropped after
/// construction to simulate a schema changing under a running job.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Mutex<HashMap<String, MemoryTable>>,
    fail_count: bool,
    fail_select_at: Option<usize>,
    key_queries: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table with its ordered columns.
    pub fn with_table(self, table: &str, columns: &[&str]) -> Self {
        self.lock().insert(
            table.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: Vec::new(),
            },
        );
        self
    }

    /// Add a row to its table, creating the table from the row's columns if needed.
    pub fn with_row(self, row: Row) -> Self {
        self.insert(row);
        self
    }

    /// Make `count` fail.
    pub fn failing_count(mut self) -> Self {
        self.fail_count = true;
        self
    }

    /// Let the first `served` calls to `select_keys` succeed and fail the next
    /// one. Later calls succeed again.
    pub fn failing_select_after(mut self, served: usize) -> Self {
        self.fail_select_at = Some(served);
        self
    }

    pub fn insert(&self, row: Row) {
        let mut tables = self.lock();
        let table = tables.entry(row.table.clone()).or_insert_with(|| MemoryTable {
            columns: row.values.keys().cloned().collect(),
            rows: Vec::new(),
        });
        table.rows.push(row);
    }

    /// Remove a table.
    pub fn drop_table(&self, table: &str) {
        self.lock().remove(table);
    }

    /// Number of `select_keys` calls received, failed ones included.
    pub fn key_queries(&self) -> usize {
        self.key_queries.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryTable>> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn table(&self, table: &str) -> Result<MemoryTable, SourceError> {
        self.lock()
            .get(table)
            .cloned()
            .ok_or_else(|| SourceError::missing_table(table))
    }

    fn check_selection(selection: &Selection) -> Result<(), SourceError> {
        match selection.predicate {
            None => Ok(()),
            Some(ref predicate) => Err(SourceError::query(format!(
                "predicates are not supported in memory: {}",
                predicate
            ))),
        }
    }
}

#[async_trait]
impl RelationalSource for MemorySource {
    async fn count(&self, table: &str, selection: &Selection) -> Result<u64, SourceError> {
        if self.fail_count {
            return Err(SourceError::query("count failed"));
        }
        Self::check_selection(selection)?;
        Ok(self.table(table)?.rows.len() as u64)
    }

    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        selection: &Selection,
        after: Option<&PrimaryKey>,
        window: usize,
    ) -> Result<Vec<PrimaryKey>, SourceError> {
        Self::check_selection(selection)?;
        let call = self.key_queries.fetch_add(1, Ordering::SeqCst);
        if self.fail_select_at == Some(call) {
            return Err(SourceError::connection("key query lost its connection"));
        }

        let mut keys: Vec<PrimaryKey> = self
            .table(table)?
            .rows
            .iter()
            .filter_map(|row| row.key(key_column))
            .filter(|key| after.map_or(true, |after| key > after))
            .collect();
        keys.sort();
        keys.truncate(window);
        Ok(keys)
    }

    async fn fetch_in(
        &self,
        table: &str,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, SourceError> {
        Ok(self
            .table(table)?
            .rows
            .into_iter()
            .filter(|row| {
                row.get(column)
                    .is_some_and(|v| values.iter().any(|wanted| wanted.same_value(v)))
            })
            .collect())
    }

    async fn fetch_joined(
        &self,
        table: &str,
        key_column: &str,
        secondary: &Secondary,
        value: &Scalar,
    ) -> Result<Vec<Row>, SourceError> {
        let remote: Vec<Scalar> = self
            .table(&secondary.table)?
            .rows
            .iter()
            .filter(|link| {
                link.get(&secondary.local_key)
                    .is_some_and(|v| v.same_value(value))
            })
            .filter_map(|link| link.get(&secondary.remote_key).cloned())
            .collect();

        let rows = self.table(table)?.rows;
        Ok(remote
            .iter()
            .filter_map(|key| {
                rows.iter()
                    .find(|row| row.get(key_column).is_some_and(|v| v.same_value(key)))
                    .cloned()
            })
            .collect())
    }

    async fn table_schema(&self, table: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.table(table)?.columns)
    }
}
