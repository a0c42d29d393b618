//! Loading the relationships folded into each document.

use std::fs;
use std::path::Path;

use crate::IndexingError;
use relational_indexer_shared::{Relation, RelationshipSpec};

/// The DMOZ category tree: categories with their pages, news groups and
/// alternative-language links, plus the parent chain and direct children.
pub fn default_relationship_spec() -> RelationshipSpec {
    let by_category = |table: &str| Relation::OneToMany {
        table: table.to_string(),
        foreign_key: "category_id".to_string(),
    };

    RelationshipSpec::new("categories")
        .with_relationship("alternative_languages", by_category("alternative_languages"))
        .with_relationship("external_pages", by_category("external_pages"))
        .with_relationship("news_groups", by_category("news_groups"))
        .with_relationship(
            "parent_category",
            Relation::SelfReferential {
                foreign_key: "parent_id".to_string(),
                backref: Some("child_categories".to_string()),
            },
        )
}

/// Load a `RelationshipSpec` from a JSON file.
pub(crate) fn read_relationship_spec(path: &Path) -> Result<RelationshipSpec, IndexingError> {
    let content = fs::read_to_string(path)
        .map_err(|e| IndexingError::config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&content).map_err(|e| {
        IndexingError::config(format!(
            "invalid relationship file {}: {}",
            path.display(),
            e
        ))
    })
}
