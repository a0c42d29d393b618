//! # Relational Indexer Shared
//!
//! Types shared by the repository, pipeline and binary crates: source rows and
//! primary keys, the nested documents sent to the search index, the static
//! relationship set and connection descriptors.

pub mod connection;
pub mod document;
pub mod relationship;
pub mod row;
pub mod target;

pub use connection::{SinkNode, SourceConnection};
pub use document::{Document, FieldValue};
pub use relationship::{
    DocumentMap, Relation, RelationshipKind, Relationship, RelationshipSpec, Secondary,
};
pub use row::{PrimaryKey, Row, Scalar, Selection};
pub use target::IndexTarget;
