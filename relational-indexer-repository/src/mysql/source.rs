//! MySQL source implementation.
//!
//! This module provides the concrete implementation of `RelationalSource`
//! using `sqlx`.

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions};
use sqlx::query::Query;
use sqlx::{MySql, MySqlPool, QueryBuilder, Row as _};
use tracing::{debug, info, instrument};

use crate::errors::SourceError;
use crate::interfaces::RelationalSource;
use crate::mysql::decode::decode_row;
use relational_indexer_shared::{PrimaryKey, Row, Scalar, Secondary, Selection, SourceConnection};

/// Default MySQL port.
const DEFAULT_PORT: u16 = 3306;

/// Source backed by one MySQL server.
///
/// Each instance holds a single physical connection; concurrency comes from
/// the pool of instances, not from inside one instance.
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Connect to the server described by `connection`.
    ///
    /// # Returns
    ///
    /// * `Ok(MySqlSource)` - A connected source
    /// * `Err(SourceError)` - If the connection cannot be established
    pub async fn connect(connection: &SourceConnection) -> Result<Self, SourceError> {
        let options = MySqlConnectOptions::new()
            .host(connection.hostname())
            .port(connection.port().unwrap_or(DEFAULT_PORT))
            .username(&connection.user)
            .password(connection.expose_secret())
            .database(&connection.schema)
            .charset("utf8mb4");

        let pool = MySqlPoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| SourceError::connection(format!("{}: {}", connection, e)))?;

        info!(connection = %connection, "Connected to MySQL source");

        Ok(Self { pool })
    }
}

/// Quote an identifier for MySQL.
fn quote(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

fn bind_scalar<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Scalar,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Scalar::Bool(v) => query.bind(*v),
        Scalar::Int(v) => query.bind(*v),
        Scalar::UInt(v) => query.bind(*v),
        Scalar::Float(v) => query.bind(*v),
        Scalar::Text(v) => query.bind(v.clone()),
    }
}

fn push_scalar(builder: &mut QueryBuilder<'_, MySql>, value: &Scalar) {
    match value {
        Scalar::Bool(v) => builder.push_bind(*v),
        Scalar::Int(v) => builder.push_bind(*v),
        Scalar::UInt(v) => builder.push_bind(*v),
        Scalar::Float(v) => builder.push_bind(*v),
        Scalar::Text(v) => builder.push_bind(v.clone()),
    };
}

#[async_trait]
impl RelationalSource for MySqlSource {
    async fn count(&self, table: &str, selection: &Selection) -> Result<u64, SourceError> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE ({})",
            quote(table),
            selection.sql()
        );
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;

        u64::try_from(count).map_err(|e| SourceError::decode(e.to_string()))
    }

    #[instrument(skip(self, selection), fields(table = %table))]
    async fn select_keys(
        &self,
        table: &str,
        key_column: &str,
        selection: &Selection,
        after: Option<&PrimaryKey>,
        window: usize,
    ) -> Result<Vec<PrimaryKey>, SourceError> {
        let mut builder = QueryBuilder::<MySql>::new(format!(
            "SELECT {key} FROM {table} WHERE ({predicate})",
            key = quote(key_column),
            table = quote(table),
            predicate = selection.sql()
        ));
        if let Some(after) = after {
            builder.push(format!(" AND {} > ", quote(key_column)));
            push_scalar(&mut builder, &after.to_scalar());
        }
        builder.push(format!(" ORDER BY {} LIMIT ", quote(key_column)));
        builder.push_bind(window as u64);

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut keys = Vec::with_capacity(rows.len());
        for row in &rows {
            let decoded = decode_row(table, row)?;
            let key = decoded.key(key_column).ok_or_else(|| {
                SourceError::decode(format!("{}.{} is not a usable key", table, key_column))
            })?;
            keys.push(key);
        }

        debug!(count = keys.len(), "Selected key window");
        Ok(keys)
    }

    async fn fetch_in(
        &self,
        table: &str,
        column: &str,
        values: &[Scalar],
    ) -> Result<Vec<Row>, SourceError> {
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<MySql>::new(format!(
            "SELECT * FROM {} WHERE {} IN (",
            quote(table),
            quote(column)
        ));
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            push_scalar(&mut builder, value);
        }
        builder.push(")");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    async fn fetch_joined(
        &self,
        table: &str,
        key_column: &str,
        secondary: &Secondary,
        value: &Scalar,
    ) -> Result<Vec<Row>, SourceError> {
        let sql = format!(
            "SELECT r.* FROM {table} r JOIN {join} s ON s.{remote} = r.{key} WHERE s.{local} = ?",
            table = quote(table),
            join = quote(&secondary.table),
            remote = quote(&secondary.remote_key),
            key = quote(key_column),
            local = quote(&secondary.local_key),
        );

        let rows = bind_scalar(sqlx::query(&sql), value)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| decode_row(table, row)).collect()
    }

    async fn table_schema(&self, table: &str) -> Result<Vec<String>, SourceError> {
        let query = r#"
            SELECT column_name AS column_name
            FROM information_schema.columns
            WHERE table_schema = DATABASE()
            AND table_name = ?
            ORDER BY ordinal_position
        "#;

        let rows = sqlx::query(query)
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Err(SourceError::missing_table(table));
        }

        rows.iter()
            .map(|row| row.try_get::<String, _>("column_name").map_err(SourceError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote("categories"), "`categories`");
        assert_eq!(quote("odd`name"), "`odd``name`");
    }
}
