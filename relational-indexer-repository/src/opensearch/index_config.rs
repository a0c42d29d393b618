//! OpenSearch index configuration and mappings.
//!
//! Documents are assembled from arbitrary tables, so fields are mapped
//! dynamically; only the fields the loader itself adds are declared.

use serde_json::{json, Value};

/// Field stamped on every document with its document type.
pub const DOC_TYPE_FIELD: &str = "doc_type";

/// Get the settings and mappings used when the loader creates an index.
///
/// - 1 primary shard, 1 replica
/// - dynamic mapping for assembled fields
/// - `doc_type` as a keyword, so several types can share one index
pub fn get_index_settings() -> Value {
    json!({
        "settings": {
            "number_of_shards": 1,
            "number_of_replicas": 1
        },
        "mappings": {
            "dynamic": true,
            "properties": {
                DOC_TYPE_FIELD: {
                    "type": "keyword"
                }
            }
        }
    })
}
