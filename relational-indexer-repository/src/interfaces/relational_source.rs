//! Relational source trait definition.

use async_trait::async_trait;

use crate::errors::SourceError;
use relational_indexer_shared::{PrimaryKey, Row, Scalar, Secondary, Selection};

/// Read-only access to the relational source.
///
/// These are the primitives the pipeline builds on: counting and paging the
/// primary keys of the driving table, loading rows by column value, following a
/// join table and describing a table's columns.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is owned by each pool entry.
#[async_trait]
pub trait RelationalSource: Send + Sync {
    /// Count the rows of `table` matching `selection`.
    async fn count(&self, table: &str, selection: &Selection) -> Result<u64, SourceError>;

    /// Fetch the next window of primary keys, in ascending order.
    ///
    /// # Arguments
    ///
    /// * `table` - Table to page through
    /// * `key_column` - Primary-key column
    /// * `selection` - Rows to consider
    /// * `after` - Last key of the previous window; `None` starts from the beginning
    /// * `window` - Maximum number of keys to return
    ///
    /// # Returns
    ///
    /// * `Ok(keys)` - Fewer than `window` keys means the sequence is exhausted
    /// * `Err(SourceError)` - If the query fails
    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        selection: &Selection,
        after: Option<&PrimaryKey>,
        window: usize,
    ) -> Result<Vec<PrimaryKey>, SourceError>;

    /// Fetch every row of `table` whose `column` equals one of `values`.
    ///
    /// Row order is whatever the source returns.
    async fn fetch_in(
        &self,
        table: &str,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, SourceError>;

    /// Fetch the rows of `table` linked to `value` through a join table.
    ///
    /// Selects rows of `table` whose `key_column` appears as `remote_key` in
    /// `secondary` rows whose `local_key` equals `value`.
    async fn fetch_joined(
        &self,
        table: &str,
        key_column: &str,
        secondary: &Secondary,
        value: &Scalar,
    ) -> Result<Vec<Row>, SourceError>;

    /// Ordered column names of `table`.
    ///
    /// # Returns
    ///
    /// * `Err(SourceError::MissingTable)` - If the table does not exist
    async fn table_schema(&self, table: &str) -> Result<Vec<String>, SourceError>;
}
