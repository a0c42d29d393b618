//! Relationships bound against a live schema.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::errors::PipelineError;
use relational_indexer_repository::{RelationalSource, SourceError};
use relational_indexer_shared::{
    Document, FieldValue, PrimaryKey, Relation, RelationshipSpec, Row, Scalar,
};

/// A `RelationshipSpec` whose tables and columns were found in the live schema.
///
/// Holds the ordered column list of every table the relationships touch.
#[derive(Debug, Clone)]
pub struct BoundModel {
    spec: Arc<RelationshipSpec>,
    columns: HashMap<String, Vec<String>>,
}

impl BoundModel {
    /// Resolve `spec` against the schema visible through `source`.
    ///
    /// # Returns
    ///
    /// * `Ok(BoundModel)` - Every table and join column exists
    /// * `Err(PipelineError::ConnectorError)` - If a table or column is missing
    /// * `Err(PipelineError::SourceError)` - If the schema cannot be read
    #[instrument(skip_all, fields(primary_table = %spec.primary_table))]
    pub async fn bind(
        source: &dyn RelationalSource,
        spec: Arc<RelationshipSpec>,
    ) -> Result<Self, PipelineError> {
        let mut columns = HashMap::new();
        for table in spec.tables() {
            let schema = match source.table_schema(table).await {
                Ok(schema) => schema,
                Err(SourceError::MissingTable(_)) => {
                    return Err(PipelineError::connector(format!(
                        "table `{}` does not exist",
                        table
                    )))
                }
                Err(e) => return Err(e.into()),
            };
            columns.insert(table.to_string(), schema);
        }

        let model = Self { spec, columns };
        model.check_columns()?;

        debug!(tables = model.columns.len(), "Relationship model bound");
        Ok(model)
    }

    fn check_columns(&self) -> Result<(), PipelineError> {
        let primary = self.spec.primary_table.as_str();
        let key = self.spec.primary_key.as_str();
        self.require(primary, key)?;

        for relationship in &self.spec.relationships {
            match &relationship.relation {
                Relation::OneToMany { table, foreign_key }
                | Relation::OneToOne { table, foreign_key } => {
                    self.require(table, foreign_key)?;
                }
                Relation::ManyToOne {
                    table, foreign_key, ..
                } => {
                    self.require(primary, foreign_key)?;
                    self.require(table, relationship.relation.referenced_key(key))?;
                }
                Relation::ManyToMany {
                    table, secondary, ..
                } => {
                    self.require(&secondary.table, &secondary.local_key)?;
                    self.require(&secondary.table, &secondary.remote_key)?;
                    self.require(table, relationship.relation.referenced_key(key))?;
                }
                Relation::SelfReferential { foreign_key, .. } => {
                    self.require(primary, foreign_key)?;
                }
            }
        }
        Ok(())
    }

    fn require(&self, table: &str, column: &str) -> Result<(), PipelineError> {
        if self.columns(table).iter().any(|c| c == column) {
            Ok(())
        } else {
            Err(PipelineError::connector(format!(
                "column `{}.{}` does not exist",
                table, column
            )))
        }
    }

    pub fn spec(&self) -> &RelationshipSpec {
        &self.spec
    }

    /// Ordered columns of a bound table; empty for tables outside the model.
    pub fn columns(&self, table: &str) -> &[String] {
        self.columns.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Fold a row into a flat document holding every column of its table.
    ///
    /// Columns the row did not load are null.
    pub fn fold(&self, row: &Row) -> Document {
        let mut document = Document::new();
        for column in self.columns(&row.table) {
            document.insert(column.clone(), FieldValue::Null);
        }
        for (column, value) in &row.values {
            document.insert(column.clone(), FieldValue::from(value.clone()));
        }
        document
    }

    /// Load the primary rows for `keys`, in key order.
    ///
    /// Keys without a row (deleted since they were paged) are left out.
    pub async fn fetch_primary(
        &self,
        source: &dyn RelationalSource,
        keys: &[PrimaryKey],
    ) -> Result<Vec<Row>, PipelineError> {
        let values: Vec<Scalar> = keys.iter().map(PrimaryKey::to_scalar).collect();
        let rows = source
            .fetch_in(&self.spec.primary_table, &self.spec.primary_key, &values)
            .await?;

        let mut by_key: HashMap<PrimaryKey, Row> = rows
            .into_iter()
            .filter_map(|row| row.key(&self.spec.primary_key).map(|key| (key, row)))
            .collect();

        Ok(keys.iter().filter_map(|key| by_key.remove(key)).collect())
    }
}
