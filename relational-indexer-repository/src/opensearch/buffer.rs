//! Write buffer feeding the bulk API.

use serde_json::Value;
use tokio::sync::Mutex;

/// A document waiting for the next bulk request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingDocument {
    pub index: String,
    pub id: String,
    pub body: Value,
}

/// Documents accumulated until a write chunk is full.
///
/// The lock is held only to push or swap out the pending documents; bulk
/// requests are sent by the caller after the chunk has been taken.
#[derive(Debug)]
pub(crate) struct BulkBuffer {
    chunk_size: usize,
    pending: Mutex<Vec<PendingDocument>>,
}

impl BulkBuffer {
    pub fn new(chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            pending: Mutex::new(Vec::with_capacity(chunk_size)),
        }
    }

    /// Buffer one document; returns a full chunk once `chunk_size` are pending.
    pub async fn push(&self, document: PendingDocument) -> Option<Vec<PendingDocument>> {
        let mut pending = self.pending.lock().await;
        pending.push(document);
        if pending.len() >= self.chunk_size {
            Some(std::mem::replace(
                &mut *pending,
                Vec::with_capacity(self.chunk_size),
            ))
        } else {
            None
        }
    }

    /// Take every pending document.
    pub async fn drain(&self) -> Vec<PendingDocument> {
        std::mem::take(&mut *self.pending.lock().await)
    }
}
