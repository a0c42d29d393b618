//! Search sink that records every call.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::SinkError;
use crate::interfaces::{IndexSettings, SearchSink};
use relational_indexer_shared::{Document, IndexTarget, PrimaryKey};

/// A document that reached a (simulated) bulk request.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedDocument {
    pub target: IndexTarget,
    pub id: PrimaryKey,
    pub document: Document,
}

#[derive(Debug, Default)]
struct Recorded {
    pending: Vec<SubmittedDocument>,
    indexed: Vec<SubmittedDocument>,
    bulk_sizes: Vec<usize>,
    submits: usize,
    flushes: usize,
    refreshes: Vec<String>,
    settings: Vec<(String, IndexSettings)>,
    created: BTreeSet<String>,
}

/// Which settings updates the sink refuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingsRejection {
    None,
    All,
    MergePolicy,
}

/// Sink that buffers like a real bulk client and records what it was asked to do.
#[derive(Debug)]
pub struct RecordingSink {
    write_chunk_size: usize,
    fail_after: Option<usize>,
    reject_settings: SettingsRejection,
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new(write_chunk_size: usize) -> Self {
        Self {
            write_chunk_size: write_chunk_size.max(1),
            fail_after: None,
            reject_settings: SettingsRejection::None,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    /// Fail every `submit` after the first `submits` succeeded.
    pub fn failing_after(mut self, submits: usize) -> Self {
        self.fail_after = Some(submits);
        self
    }

    /// Fail every settings update.
    pub fn rejecting_settings(mut self) -> Self {
        self.reject_settings = SettingsRejection::All;
        self
    }

    /// Fail every settings update that touches the merge policy, as a node
    /// that does not know the setting would.
    pub fn rejecting_merge_settings(mut self) -> Self {
        self.reject_settings = SettingsRejection::MergePolicy;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Recorded> {
        self.recorded
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Documents written by bulk requests so far.
    pub fn indexed(&self) -> Vec<SubmittedDocument> {
        self.lock().indexed.clone()
    }

    /// Documents buffered but not yet written.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Size of every bulk request, in order.
    pub fn bulk_sizes(&self) -> Vec<usize> {
        self.lock().bulk_sizes.clone()
    }

    pub fn flushes(&self) -> usize {
        self.lock().flushes
    }

    /// Indexes refreshed, one entry per refresh.
    pub fn refreshes(&self) -> Vec<String> {
        self.lock().refreshes.clone()
    }

    pub fn settings_updates(&self) -> Vec<(String, IndexSettings)> {
        self.lock().settings.clone()
    }

    pub fn created_indexes(&self) -> Vec<String> {
        self.lock().created.iter().cloned().collect()
    }

    fn write_bulk(recorded: &mut Recorded) {
        if recorded.pending.is_empty() {
            return;
        }
        let batch = std::mem::take(&mut recorded.pending);
        recorded.bulk_sizes.push(batch.len());
        recorded.indexed.extend(batch);
    }
}

#[async_trait]
impl SearchSink for RecordingSink {
    async fn submit(
        &self,
        target: &IndexTarget,
        id: &PrimaryKey,
        document: Document,
    ) -> Result<(), SinkError> {
        let mut recorded = self.lock();
        if self.fail_after.is_some_and(|limit| recorded.submits >= limit) {
            return Err(SinkError::connection("simulated connection loss"));
        }
        recorded.submits += 1;
        recorded.pending.push(SubmittedDocument {
            target: target.clone(),
            id: id.clone(),
            document,
        });
        if recorded.pending.len() >= self.write_chunk_size {
            Self::write_bulk(&mut recorded);
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let mut recorded = self.lock();
        recorded.flushes += 1;
        Self::write_bulk(&mut recorded);
        Ok(())
    }

    async fn create_index_if_missing(&self, index: &str) -> Result<(), SinkError> {
        self.lock().created.insert(index.to_string());
        Ok(())
    }

    async fn update_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<(), SinkError> {
        let rejected = match self.reject_settings {
            SettingsRejection::None => false,
            SettingsRejection::All => true,
            SettingsRejection::MergePolicy => settings.segments_per_tier.is_some(),
        };
        if rejected {
            return Err(SinkError::settings(
                "unknown setting [index.merge.policy.segments_per_tier]",
            ));
        }
        self.lock()
            .settings
            .push((index.to_string(), settings.clone()));
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), SinkError> {
        self.lock().refreshes.push(index.to_string());
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SinkError> {
        Ok(true)
    }
}
