//! Connection list files.
//!
//! Source files hold `host user secret` lines and sink files hold
//! `scheme host port` lines. Lines that do not split into exactly three
//! fields are skipped.

use std::fs;
use std::path::Path;

use tracing::warn;
use url::Url;

use crate::IndexingError;
use relational_indexer_shared::{SinkNode, SourceConnection};

/// Parse source connections for `schema`.
pub fn parse_source_connections(schema: &str, content: &str) -> Vec<SourceConnection> {
    fields(content)
        .map(|[host, user, secret]| SourceConnection::new(schema, host, user, secret))
        .collect()
}

/// Parse sink nodes; lines with an invalid port are skipped.
pub fn parse_sink_nodes(content: &str) -> Vec<SinkNode> {
    fields(content)
        .filter_map(|[scheme, host, port]| match port.parse() {
            Ok(port) => Some(SinkNode::new(scheme, host, port)),
            Err(_) => {
                warn!(port, "Skipping sink node with invalid port");
                None
            }
        })
        .collect()
}

/// Sink node from a URL such as `http://localhost:9200`.
pub fn sink_node_from_url(raw: &str) -> Result<SinkNode, IndexingError> {
    let url = Url::parse(raw)
        .map_err(|e| IndexingError::config(format!("invalid OpenSearch URL {}: {}", raw, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| IndexingError::config(format!("OpenSearch URL {} has no host", raw)))?;
    let port = url.port_or_known_default().unwrap_or(9200);
    Ok(SinkNode::new(url.scheme(), host, port))
}

pub(crate) fn read_source_connections(
    schema: &str,
    path: &Path,
) -> Result<Vec<SourceConnection>, IndexingError> {
    let connections = parse_source_connections(schema, &read(path)?);
    if connections.is_empty() {
        return Err(IndexingError::config(format!(
            "no source connections in {}",
            path.display()
        )));
    }
    Ok(connections)
}

pub(crate) fn read_sink_nodes(path: &Path) -> Result<Vec<SinkNode>, IndexingError> {
    let nodes = parse_sink_nodes(&read(path)?);
    if nodes.is_empty() {
        return Err(IndexingError::config(format!(
            "no sink nodes in {}",
            path.display()
        )));
    }
    Ok(nodes)
}

fn read(path: &Path) -> Result<String, IndexingError> {
    fs::read_to_string(path)
        .map_err(|e| IndexingError::config(format!("cannot read {}: {}", path.display(), e)))
}

fn fields(content: &str) -> impl Iterator<Item = [&str; 3]> {
    content.lines().filter_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        <[&str; 3]>::try_from(parts).ok()
    })
}
