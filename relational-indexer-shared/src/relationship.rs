//! Static description of how the primary table relates to secondary tables.
//!
//! A `RelationshipSpec` is supplied by the caller (configuration or code) and is
//! read-only once built. It is never discovered from the live schema; binding
//! it against a connection only checks that the named tables and columns exist.

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// Join table of a many-to-many relationship.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Secondary {
    /// Name of the join table.
    pub table: String,
    /// Column of the join table referencing the primary row.
    pub local_key: String,
    /// Column of the join table referencing the related row.
    pub remote_key: String,
}

/// Closed set of relationship kinds; used as the dispatch key when assembling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationshipKind {
    OneToMany,
    ManyToOne,
    OneToOne,
    ManyToMany,
    SelfReferential,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::OneToMany => "one_to_many",
            RelationshipKind::ManyToOne => "many_to_one",
            RelationshipKind::OneToOne => "one_to_one",
            RelationshipKind::ManyToMany => "many_to_many",
            RelationshipKind::SelfReferential => "self_referential",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one relationship is resolved against the source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Relation {
    /// Rows of `table` whose `foreign_key` references the primary row.
    OneToMany { table: String, foreign_key: String },
    /// The row of `table` referenced by the primary row's `foreign_key`.
    ///
    /// `references` names the key column of `table`; it defaults to the
    /// primary-key column.
    ManyToOne {
        table: String,
        foreign_key: String,
        #[serde(default)]
        references: Option<String>,
    },
    /// The single row of `table` whose `foreign_key` references the primary row.
    OneToOne { table: String, foreign_key: String },
    /// Rows of `table` linked to the primary row through a join table.
    ///
    /// `references` names the key column of `table` the join table points at;
    /// it defaults to the primary-key column.
    ManyToMany {
        table: String,
        secondary: Secondary,
        #[serde(default)]
        references: Option<String>,
    },
    /// Adjacency list on the primary table: `foreign_key` points at the parent.
    /// When `backref` is set, the row's direct children are attached under it.
    SelfReferential {
        foreign_key: String,
        #[serde(default)]
        backref: Option<String>,
    },
}

impl Relation {
    pub fn kind(&self) -> RelationshipKind {
        match self {
            Relation::OneToMany { .. } => RelationshipKind::OneToMany,
            Relation::ManyToOne { .. } => RelationshipKind::ManyToOne,
            Relation::OneToOne { .. } => RelationshipKind::OneToOne,
            Relation::ManyToMany { .. } => RelationshipKind::ManyToMany,
            Relation::SelfReferential { .. } => RelationshipKind::SelfReferential,
        }
    }

    /// Key column of the related table, for relations that point at one.
    pub fn referenced_key<'a>(&'a self, primary_key: &'a str) -> &'a str {
        match self {
            Relation::ManyToOne { references, .. } | Relation::ManyToMany { references, .. } => {
                references.as_deref().unwrap_or(primary_key)
            }
            _ => primary_key,
        }
    }

    /// Table holding the related rows, or `None` for self-referential relations.
    pub fn table(&self) -> Option<&str> {
        match self {
            Relation::OneToMany { table, .. }
            | Relation::ManyToOne { table, .. }
            | Relation::OneToOne { table, .. }
            | Relation::ManyToMany { table, .. } => Some(table),
            Relation::SelfReferential { .. } => None,
        }
    }
}

/// A named relationship of the primary table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Relationship {
    pub name: String,
    #[serde(flatten)]
    pub relation: Relation,
}

impl Relationship {
    pub fn new(name: impl Into<String>, relation: Relation) -> Self {
        Self {
            name: name.into(),
            relation,
        }
    }

    pub fn kind(&self) -> RelationshipKind {
        self.relation.kind()
    }
}

/// Mapping from relationship name to document field name.
///
/// Relationships without an entry keep their own name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct DocumentMap(BTreeMap<String, String>);

impl DocumentMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, relation: impl Into<String>, field: impl Into<String>) -> Self {
        self.0.insert(relation.into(), field.into());
        self
    }

    pub fn field_for<'a>(&'a self, relation: &'a str) -> &'a str {
        self.0.get(relation).map(String::as_str).unwrap_or(relation)
    }
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// Primary table plus every relationship folded into its documents.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RelationshipSpec {
    pub primary_table: String,
    /// Primary-key column; related tables use it too unless a relation names
    /// its own `references` column.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub document_map: DocumentMap,
}

impl RelationshipSpec {
    pub fn new(primary_table: impl Into<String>) -> Self {
        Self {
            primary_table: primary_table.into(),
            primary_key: default_primary_key(),
            relationships: Vec::new(),
            document_map: DocumentMap::new(),
        }
    }

    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn with_relationship(mut self, name: impl Into<String>, relation: Relation) -> Self {
        self.relationships.push(Relationship::new(name, relation));
        self
    }

    pub fn with_document_map(mut self, document_map: DocumentMap) -> Self {
        self.document_map = document_map;
        self
    }

    /// Every table the relationships touch, primary table first, without duplicates.
    pub fn tables(&self) -> Vec<&str> {
        let mut tables = vec![self.primary_table.as_str()];
        for relationship in &self.relationships {
            let related = match &relationship.relation {
                Relation::ManyToMany {
                    table, secondary, ..
                } => {
                    vec![table.as_str(), secondary.table.as_str()]
                }
                other => other.table().into_iter().collect(),
            };
            for table in related {
                if !tables.contains(&table) {
                    tables.push(table);
                }
            }
        }
        tables
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories_spec() -> RelationshipSpec {
        RelationshipSpec::new("categories")
            .with_relationship(
                "external_pages",
                Relation::OneToMany {
                    table: "external_pages".into(),
                    foreign_key: "category_id".into(),
                },
            )
            .with_relationship(
                "related_categories",
                Relation::ManyToMany {
                    table: "categories".into(),
                    secondary: Secondary {
                        table: "related".into(),
                        local_key: "category_id".into(),
                        remote_key: "related_id".into(),
                    },
                    references: None,
                },
            )
            .with_relationship(
                "parent_category",
                Relation::SelfReferential {
                    foreign_key: "parent_id".into(),
                    backref: Some("child_categories".into()),
                },
            )
    }

    #[test]
    fn test_tables_are_deduplicated() {
        assert_eq!(
            categories_spec().tables(),
            vec!["categories", "external_pages", "related"]
        );
    }

    #[test]
    fn test_kinds() {
        let spec = categories_spec();
        let kinds: Vec<_> = spec.relationships.iter().map(Relationship::kind).collect();
        assert_eq!(
            kinds,
            vec![
                RelationshipKind::OneToMany,
                RelationshipKind::ManyToMany,
                RelationshipKind::SelfReferential
            ]
        );
        assert_eq!(RelationshipKind::ManyToOne.to_string(), "many_to_one");
    }

    #[test]
    fn test_referenced_key_defaults_to_primary_key() {
        let default = Relation::ManyToOne {
            table: "categories".into(),
            foreign_key: "category_id".into(),
            references: None,
        };
        let named = Relation::ManyToOne {
            table: "categories".into(),
            foreign_key: "category_id".into(),
            references: Some("id".into()),
        };

        assert_eq!(default.referenced_key("page_id"), "page_id");
        assert_eq!(named.referenced_key("page_id"), "id");
    }

    #[test]
    fn test_deserialize_references() {
        let relationship: Relationship = serde_json::from_str(
            r#"{"name": "category", "kind": "many_to_one", "table": "categories",
                "foreign_key": "category_id", "references": "id"}"#,
        )
        .unwrap();

        assert_eq!(relationship.relation.referenced_key("page_id"), "id");
    }

    #[test]
    fn test_document_map_defaults_to_relation_name() {
        let map = DocumentMap::new().with("parent_category", "ancestors");
        assert_eq!(map.field_for("parent_category"), "ancestors");
        assert_eq!(map.field_for("external_pages"), "external_pages");
    }

    #[test]
    fn test_deserialize_spec() {
        let spec: RelationshipSpec = serde_json::from_str(
            r#"{
                "primary_table": "categories",
                "relationships": [
                    {"name": "news_groups", "kind": "one_to_many", "table": "news_groups", "foreign_key": "category_id"},
                    {"name": "parent_category", "kind": "self_referential", "foreign_key": "parent_id"}
                ],
                "document_map": {"news_groups": "groups"}
            }"#,
        )
        .unwrap();

        assert_eq!(spec.primary_key, "id");
        assert_eq!(spec.relationships.len(), 2);
        assert_eq!(
            spec.relationships[1].relation,
            Relation::SelfReferential {
                foreign_key: "parent_id".into(),
                backref: None
            }
        );
        assert_eq!(spec.document_map.field_for("news_groups"), "groups");
    }
}
