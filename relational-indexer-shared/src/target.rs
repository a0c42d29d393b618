//! Destination of indexed documents.

use std::fmt;

/// Index and document type that documents are written to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexTarget {
    pub index: String,
    pub doc_type: String,
}

impl IndexTarget {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
        }
    }
}

impl fmt::Display for IndexTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.index, self.doc_type)
    }
}
