//! OpenSearch sink implementation.
//!
//! Buffers submitted documents and writes them with the bulk API, rotating
//! requests across the configured nodes.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use opensearch::{
    cluster::ClusterHealthParts,
    http::request::JsonBody,
    http::transport::{SingleNodeConnectionPool, TransportBuilder},
    indices::{IndicesCreateParts, IndicesExistsParts, IndicesPutSettingsParts, IndicesRefreshParts},
    BulkParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument, warn};
use url::Url;

use crate::config::SinkConfig;
use crate::errors::SinkError;
use crate::interfaces::{IndexSettings, SearchSink};
use crate::opensearch::buffer::{BulkBuffer, PendingDocument};
use crate::opensearch::index_config::{get_index_settings, DOC_TYPE_FIELD};
use relational_indexer_shared::{Document, IndexTarget, PrimaryKey, SinkNode};

/// OpenSearch sink.
///
/// # Example
///
/// ```ignore
/// let nodes = vec![SinkNode::new("http", "127.0.0.1", 9200)];
/// let sink = OpenSearchSink::new(&nodes, SinkConfig::default())?;
///
/// sink.create_index_if_missing("dmoz").await?;
/// sink.submit(&IndexTarget::new("dmoz", "category"), &PrimaryKey::Int(1), document).await?;
/// sink.flush().await?;
/// ```
pub struct OpenSearchSink {
    nodes: Vec<OpenSearch>,
    next_node: AtomicUsize,
    buffer: BulkBuffer,
}

impl OpenSearchSink {
    /// Create a sink writing to the given nodes.
    ///
    /// # Arguments
    ///
    /// * `nodes` - The OpenSearch nodes; bulk requests rotate across them
    /// * `config` - The sink configuration containing the write chunk size
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchSink)` - A new sink instance
    /// * `Err(SinkError)` - If no node is given or a transport cannot be built
    pub fn new(nodes: &[SinkNode], config: SinkConfig) -> Result<Self, SinkError> {
        if nodes.is_empty() {
            return Err(SinkError::connection("no OpenSearch node configured"));
        }

        let mut clients = Vec::with_capacity(nodes.len());
        for node in nodes {
            let url = node.url();
            let parsed_url = Url::parse(&url).map_err(|e| SinkError::connection(e.to_string()))?;

            let conn_pool = SingleNodeConnectionPool::new(parsed_url);
            let transport = TransportBuilder::new(conn_pool)
                .disable_proxy()
                .build()
                .map_err(|e| SinkError::connection(e.to_string()))?;

            clients.push(OpenSearch::new(transport));
            info!(url = %url, "Created OpenSearch client");
        }

        Ok(Self {
            nodes: clients,
            next_node: AtomicUsize::new(0),
            buffer: BulkBuffer::new(config.write_chunk_size),
        })
    }

    /// Next node in rotation.
    fn node(&self) -> &OpenSearch {
        let i = self.next_node.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        &self.nodes[i]
    }

    /// Write one bulk request.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    async fn send_bulk(&self, documents: Vec<PendingDocument>) -> Result<(), SinkError> {
        let total = documents.len();
        let body = bulk_body(documents);

        let response = self
            .node()
            .bulk(BulkParts::None)
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SinkError::bulk_operation(
                total,
                total,
                format!("status {}: {}", status, error_body),
            ));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SinkError::bulk_operation(total, total, e.to_string()))?;

        if let Some((failed, reason)) = bulk_failures(&response_body) {
            error!(failed = failed, total = total, reason = %reason, "Bulk request had failures");
            return Err(SinkError::bulk_operation(failed, total, reason));
        }

        debug!(count = total, "Bulk request indexed documents");
        Ok(())
    }
}

/// Build the document body, stamping the document type.
fn document_body(target: &IndexTarget, document: Document) -> Value {
    let mut body = document.to_json();
    if let Value::Object(ref mut fields) = body {
        fields
            .entry(DOC_TYPE_FIELD)
            .or_insert_with(|| json!(target.doc_type));
    }
    body
}

/// Interleave action lines and sources for the bulk API.
fn bulk_body(documents: Vec<PendingDocument>) -> Vec<JsonBody<Value>> {
    let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(documents.len() * 2);
    for document in documents {
        body.push(json!({"index": {"_index": document.index, "_id": document.id}}).into());
        body.push(document.body.into());
    }
    body
}

/// Count failed items of a bulk response, with the first failure reason.
fn bulk_failures(response: &Value) -> Option<(usize, String)> {
    if !response.get("errors").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let failures: Vec<&Value> = response
        .get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get("index").and_then(|i| i.get("error")))
                .collect()
        })
        .unwrap_or_default();

    let reason = failures
        .first()
        .map(|e| {
            e.get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string())
        })
        .unwrap_or_else(|| "unknown bulk failure".to_string());

    Some((failures.len().max(1), reason))
}

#[async_trait]
impl SearchSink for OpenSearchSink {
    async fn submit(
        &self,
        target: &IndexTarget,
        id: &PrimaryKey,
        document: Document,
    ) -> Result<(), SinkError> {
        let pending = PendingDocument {
            index: target.index.clone(),
            id: id.to_string(),
            body: document_body(target, document),
        };

        match self.buffer.push(pending).await {
            Some(documents) => self.send_bulk(documents).await,
            None => Ok(()),
        }
    }

    async fn flush(&self) -> Result<(), SinkError> {
        let documents = self.buffer.drain().await;
        if documents.is_empty() {
            return Ok(());
        }

        debug!(count = documents.len(), "Flushing buffered documents");
        self.send_bulk(documents).await
    }

    async fn create_index_if_missing(&self, index: &str) -> Result<(), SinkError> {
        let exists = self
            .node()
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;

        if exists.status_code().is_success() {
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        let response = self
            .node()
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(get_index_settings())
            .send()
            .await
            .map_err(|e| SinkError::index_creation(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            // Another loader may have created it in the meantime.
            if error_body.contains("resource_already_exists_exception") {
                return Ok(());
            }
            return Err(SinkError::index_creation(format!(
                "Index creation failed with status {}: {}",
                status, error_body
            )));
        }

        info!(index = %index, "Created index");
        Ok(())
    }

    async fn update_settings(
        &self,
        index: &str,
        settings: &IndexSettings,
    ) -> Result<(), SinkError> {
        if settings.is_empty() {
            return Ok(());
        }

        let response = self
            .node()
            .indices()
            .put_settings(IndicesPutSettingsParts::Index(&[index]))
            .body(settings.to_body())
            .send()
            .await
            .map_err(|e| SinkError::settings(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SinkError::settings(format!(
                "Settings update failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %index, settings = ?settings, "Updated index settings");
        Ok(())
    }

    async fn refresh(&self, index: &str) -> Result<(), SinkError> {
        let response = self
            .node()
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SinkError::refresh(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(SinkError::refresh(format!(
                "Refresh failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(index = %index, "Refreshed index");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SinkError> {
        let response = self
            .node()
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;

        let health: Value = response
            .json()
            .await
            .map_err(|e| SinkError::connection(e.to_string()))?;
        let status = health
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("unknown");

        if status == "red" {
            warn!(status = %status, "OpenSearch cluster is unhealthy");
        }
        Ok(status == "green" || status == "yellow")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relational_indexer_shared::{FieldValue, Scalar};

    #[test]
    fn test_new_requires_a_node() {
        assert!(matches!(
            OpenSearchSink::new(&[], SinkConfig::default()),
            Err(SinkError::ConnectionError(_))
        ));
    }

    #[test]
    fn test_document_body_stamps_doc_type() {
        let mut document = Document::new();
        document.insert("id", FieldValue::Scalar(Scalar::Int(1)));

        let body = document_body(&IndexTarget::new("dmoz", "category"), document);

        assert_eq!(body, json!({"id": 1, "doc_type": "category"}));
    }

    #[test]
    fn test_document_body_keeps_existing_doc_type() {
        let mut document = Document::new();
        document.insert("doc_type", FieldValue::Scalar(Scalar::Text("page".into())));

        let body = document_body(&IndexTarget::new("dmoz", "category"), document);

        assert_eq!(body["doc_type"], "page");
    }

    #[tokio::test]
    async fn test_write_chunks_become_bulk_bodies() {
        let buffer = BulkBuffer::new(10);
        let target = IndexTarget::new("dmoz", "category");

        let mut bodies = Vec::new();
        for id in 1..=25 {
            let mut document = Document::new();
            document.insert("id", FieldValue::Scalar(Scalar::Int(id)));
            let pending = PendingDocument {
                index: target.index.clone(),
                id: id.to_string(),
                body: document_body(&target, document),
            };
            if let Some(chunk) = buffer.push(pending).await {
                bodies.push(bulk_body(chunk));
            }
        }
        bodies.push(bulk_body(buffer.drain().await));

        // ceil(25 / 10) requests, two lines per document.
        let lines: Vec<usize> = bodies.iter().map(Vec::len).collect();
        assert_eq!(lines, vec![20, 20, 10]);
    }

    #[test]
    fn test_bulk_failures_none_when_clean() {
        let response = json!({"errors": false, "items": [{"index": {"status": 201}}]});
        assert!(bulk_failures(&response).is_none());
    }

    #[test]
    fn test_bulk_failures_counts_errors() {
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"status": 201}},
                {"index": {"status": 400, "error": {"type": "mapper_parsing_exception", "reason": "bad field"}}},
                {"index": {"status": 400, "error": {"type": "mapper_parsing_exception", "reason": "other"}}}
            ]
        });

        assert_eq!(bulk_failures(&response), Some((2, "bad field".to_string())));
    }
}
