//! Assembles nested documents from a primary row and its relationships.
//!
//! Every relationship kind has one handler; the handlers are looked up in a
//! table keyed by `RelationshipKind`. A handler returns the fields it adds to
//! the document, named through the `DocumentMap`.

use std::collections::{HashMap, HashSet};

use futures::future::BoxFuture;
use tracing::debug;

use crate::errors::PipelineError;
use crate::model::BoundModel;
use relational_indexer_repository::RelationalSource;
use relational_indexer_shared::{
    Document, FieldValue, PrimaryKey, Relation, Relationship, RelationshipKind, Row, Scalar,
};

type Fields = Vec<(String, FieldValue)>;

type Handler = for<'a> fn(Assembly<'a>, &'a Row, &'a Relationship) -> BoxFuture<'a, Result<Fields, PipelineError>>;

/// Source and model an assembly runs against.
#[derive(Clone, Copy)]
struct Assembly<'a> {
    source: &'a dyn RelationalSource,
    model: &'a BoundModel,
}

impl<'a> Assembly<'a> {
    fn field(&self, relation: &str) -> String {
        self.model.spec().document_map.field_for(relation).to_string()
    }

    fn key_value(&self, row: &'a Row) -> Option<&'a Scalar> {
        row.get(&self.model.spec().primary_key)
    }

    fn fold_all(&self, rows: &[Row]) -> FieldValue {
        FieldValue::List(rows.iter().map(|row| self.model.fold(row)).collect())
    }

    async fn related(
        &self,
        table: &str,
        column: &str,
        value: Option<&Scalar>,
    ) -> Result<Vec<Row>, PipelineError> {
        match value {
            Some(value) => Ok(self
                .source
                .fetch_in(table, column, std::slice::from_ref(value))
                .await?),
            None => Ok(Vec::new()),
        }
    }
}

/// Builds documents for rows of the primary table.
pub struct DocumentAssembler {
    handlers: HashMap<RelationshipKind, Handler>,
}

impl Default for DocumentAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentAssembler {
    pub fn new() -> Self {
        let mut handlers: HashMap<RelationshipKind, Handler> = HashMap::new();
        handlers.insert(RelationshipKind::OneToMany, one_to_many);
        handlers.insert(RelationshipKind::ManyToOne, many_to_one);
        handlers.insert(RelationshipKind::OneToOne, one_to_one);
        handlers.insert(RelationshipKind::ManyToMany, many_to_many);
        handlers.insert(RelationshipKind::SelfReferential, self_referential);
        Self { handlers }
    }

    /// Assemble the document for one primary row.
    ///
    /// Relationships whose table has disappeared from the source are left out
    /// of the document.
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - The row folded with every resolvable relationship
    /// * `Err(PipelineError::IntegrityError)` - If the row has no primary key or its parent chain is cyclic
    /// * `Err(PipelineError::SourceError)` - If a related fetch fails
    pub async fn assemble(
        &self,
        source: &dyn RelationalSource,
        model: &BoundModel,
        row: &Row,
    ) -> Result<Document, PipelineError> {
        let assembly = Assembly { source, model };
        let mut document = model.fold(row);

        for relationship in &model.spec().relationships {
            let handler = self.handlers.get(&relationship.kind()).ok_or_else(|| {
                PipelineError::connector(format!(
                    "no handler for {} relationship `{}`",
                    relationship.kind(),
                    relationship.name
                ))
            })?;

            match handler(assembly, row, relationship).await {
                Ok(fields) => {
                    for (field, value) in fields {
                        document.insert(field, value);
                    }
                }
                Err(PipelineError::SourceError(e)) if e.is_missing_table() => {
                    debug!(
                        relationship = %relationship.name,
                        error = %e,
                        "Skipping relationship with missing table"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let key = &model.spec().primary_key;
        if document.scalar(key).is_none() {
            return Err(PipelineError::integrity(format!(
                "document from `{}` has no value for primary key `{}`",
                row.table, key
            )));
        }

        Ok(document)
    }
}

fn one_to_many<'a>(
    assembly: Assembly<'a>,
    row: &'a Row,
    relationship: &'a Relationship,
) -> BoxFuture<'a, Result<Fields, PipelineError>> {
    Box::pin(async move {
        let Relation::OneToMany { table, foreign_key } = &relationship.relation else {
            return Ok(Vec::new());
        };
        let rows = assembly
            .related(table, foreign_key, assembly.key_value(row))
            .await?;
        Ok(vec![(assembly.field(&relationship.name), assembly.fold_all(&rows))])
    })
}

fn many_to_one<'a>(
    assembly: Assembly<'a>,
    row: &'a Row,
    relationship: &'a Relationship,
) -> BoxFuture<'a, Result<Fields, PipelineError>> {
    Box::pin(async move {
        let Relation::ManyToOne {
            table, foreign_key, ..
        } = &relationship.relation
        else {
            return Ok(Vec::new());
        };
        let key = relationship
            .relation
            .referenced_key(&assembly.model.spec().primary_key);
        let related = assembly.related(table, key, row.get(foreign_key)).await?;
        let value = related.first().map(|r| assembly.model.fold(r));
        Ok(vec![(assembly.field(&relationship.name), FieldValue::from(value))])
    })
}

fn one_to_one<'a>(
    assembly: Assembly<'a>,
    row: &'a Row,
    relationship: &'a Relationship,
) -> BoxFuture<'a, Result<Fields, PipelineError>> {
    Box::pin(async move {
        let Relation::OneToOne { table, foreign_key } = &relationship.relation else {
            return Ok(Vec::new());
        };
        let related = assembly
            .related(table, foreign_key, assembly.key_value(row))
            .await?;
        let value = related.first().map(|r| assembly.model.fold(r));
        Ok(vec![(assembly.field(&relationship.name), FieldValue::from(value))])
    })
}

fn many_to_many<'a>(
    assembly: Assembly<'a>,
    row: &'a Row,
    relationship: &'a Relationship,
) -> BoxFuture<'a, Result<Fields, PipelineError>> {
    Box::pin(async move {
        let Relation::ManyToMany {
            table, secondary, ..
        } = &relationship.relation
        else {
            return Ok(Vec::new());
        };
        let key = relationship
            .relation
            .referenced_key(&assembly.model.spec().primary_key);
        let rows = match assembly.key_value(row) {
            Some(value) => {
                assembly
                    .source
                    .fetch_joined(table, key, secondary, value)
                    .await?
            }
            None => Vec::new(),
        };
        Ok(vec![(assembly.field(&relationship.name), assembly.fold_all(&rows))])
    })
}

/// Ancestors, immediate parent first, plus the children under the backreference.
fn self_referential<'a>(
    assembly: Assembly<'a>,
    row: &'a Row,
    relationship: &'a Relationship,
) -> BoxFuture<'a, Result<Fields, PipelineError>> {
    Box::pin(async move {
        let Relation::SelfReferential {
            foreign_key,
            backref,
        } = &relationship.relation
        else {
            return Ok(Vec::new());
        };
        let spec = assembly.model.spec();

        let mut visited: HashSet<PrimaryKey> = row.key(&spec.primary_key).into_iter().collect();
        let mut ancestors = Vec::new();
        let mut parent = row.get(foreign_key).cloned();

        while let Some(parent_value) = parent.take() {
            let parent_key = PrimaryKey::from_scalar(&parent_value).ok_or_else(|| {
                PipelineError::integrity(format!(
                    "`{}.{}` holds {}, which cannot reference a row",
                    spec.primary_table, foreign_key, parent_value
                ))
            })?;
            if !visited.insert(parent_key.clone()) {
                return Err(PipelineError::integrity(format!(
                    "cycle in `{}.{}` at key {}",
                    spec.primary_table, foreign_key, parent_key
                )));
            }

            let rows = assembly
                .related(&spec.primary_table, &spec.primary_key, Some(&parent_value))
                .await?;
            // A dangling reference ends the chain.
            let Some(ancestor) = rows.into_iter().next() else {
                break;
            };
            parent = ancestor.get(foreign_key).cloned();
            ancestors.push(assembly.model.fold(&ancestor));
        }

        let mut fields = vec![(
            assembly.field(&relationship.name),
            FieldValue::List(ancestors),
        )];

        if let Some(backref) = backref {
            let children = assembly
                .related(&spec.primary_table, foreign_key, assembly.key_value(row))
                .await?;
            fields.push((assembly.field(backref), assembly.fold_all(&children)));
        }

        Ok(fields)
    })
}
