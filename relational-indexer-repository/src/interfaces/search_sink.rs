//! Search sink trait definition.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::errors::SinkError;
use relational_indexer_shared::{Document, IndexTarget, PrimaryKey};

/// Index settings applied as a bulk-load tuning step.
///
/// Only the recognized keys are sent; `None` leaves a setting untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSettings {
    /// Refresh interval as a duration string, or `"-1"` to disable refreshes.
    pub refresh_interval: Option<String>,
    /// Segments allowed per tier by the tiered merge policy; higher values
    /// merge less often.
    pub segments_per_tier: Option<u32>,
}

impl IndexSettings {
    /// Settings for bulk loading: no periodic refresh, larger merges.
    pub fn bulk() -> Self {
        Self {
            refresh_interval: Some("-1".to_string()),
            segments_per_tier: Some(30),
        }
    }

    /// Settings for interactive use after a bulk load.
    pub fn interactive() -> Self {
        Self {
            refresh_interval: Some("1s".to_string()),
            segments_per_tier: Some(10),
        }
    }

    /// Whether no setting is set.
    pub fn is_empty(&self) -> bool {
        self.refresh_interval.is_none() && self.segments_per_tier.is_none()
    }

    /// One settings value per set key, refresh interval first.
    ///
    /// Each part can be applied on its own, so a node rejecting one key does
    /// not keep the others from taking effect.
    pub fn split(&self) -> Vec<IndexSettings> {
        let mut parts = Vec::with_capacity(2);
        if self.refresh_interval.is_some() {
            parts.push(IndexSettings {
                refresh_interval: self.refresh_interval.clone(),
                segments_per_tier: None,
            });
        }
        if self.segments_per_tier.is_some() {
            parts.push(IndexSettings {
                refresh_interval: None,
                segments_per_tier: self.segments_per_tier,
            });
        }
        parts
    }

    /// Render the settings as an index settings body.
    pub fn to_body(&self) -> Value {
        let mut index = Map::new();
        if let Some(ref interval) = self.refresh_interval {
            index.insert("refresh_interval".to_string(), json!(interval));
        }
        if let Some(segments) = self.segments_per_tier {
            index.insert("merge.policy.segments_per_tier".to_string(), json!(segments));
        }
        json!({ "index": index })
    }
}

/// Abstracts the search index the documents are loaded into.
///
/// `submit` is buffered: implementations accumulate documents and issue a
/// physical bulk request once their write chunk is full. `flush` sends whatever
/// is still pending.
///
/// Indexing is an upsert keyed by the document id, so documents may arrive in
/// any order and may be submitted more than once.
#[async_trait]
pub trait SearchSink: Send + Sync {
    /// Buffer one document for indexing under `id`.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was buffered (and any resulting bulk request succeeded)
    /// * `Err(SinkError)` - If a bulk request triggered by this call failed
    async fn submit(
        &self,
        target: &IndexTarget,
        id: &PrimaryKey,
        document: Document,
    ) -> Result<(), SinkError>;

    /// Send every buffered document.
    async fn flush(&self) -> Result<(), SinkError>;

    /// Create the index unless it already exists.
    async fn create_index_if_missing(&self, index: &str) -> Result<(), SinkError>;

    /// Apply tuning settings to the index.
    async fn update_settings(&self, index: &str, settings: &IndexSettings)
        -> Result<(), SinkError>;

    /// Make every indexed document visible to searches.
    async fn refresh(&self, index: &str) -> Result<(), SinkError>;

    /// Check if the search engine is healthy and reachable.
    async fn health_check(&self) -> Result<bool, SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_settings_body() {
        assert_eq!(
            IndexSettings::bulk().to_body(),
            json!({"index": {"refresh_interval": "-1", "merge.policy.segments_per_tier": 30}})
        );
    }

    #[test]
    fn test_partial_settings_body() {
        let settings = IndexSettings {
            refresh_interval: Some("1s".to_string()),
            segments_per_tier: None,
        };
        assert_eq!(settings.to_body(), json!({"index": {"refresh_interval": "1s"}}));
        assert!(IndexSettings::default().is_empty());
    }

    #[test]
    fn test_split_puts_refresh_interval_first() {
        let parts = IndexSettings::bulk().split();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].to_body(), json!({"index": {"refresh_interval": "-1"}}));
        assert_eq!(
            parts[1].to_body(),
            json!({"index": {"merge.policy.segments_per_tier": 30}})
        );
        assert!(IndexSettings::default().split().is_empty());
    }
}
