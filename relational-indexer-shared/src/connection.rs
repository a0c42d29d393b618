//! Connection descriptors read from configuration.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Identity of one relational source: schema, host and credentials.
///
/// Immutable once built; lives for the whole process.
#[derive(Clone)]
pub struct SourceConnection {
    pub schema: String,
    pub host: String,
    pub user: String,
    pub secret: SecretString,
}

impl SourceConnection {
    pub fn new(
        schema: impl Into<String>,
        host: impl Into<String>,
        user: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            schema: schema.into(),
            host: host.into(),
            user: user.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    /// Host name without an optional `:port` suffix.
    pub fn hostname(&self) -> &str {
        self.host.split(':').next().unwrap_or(&self.host)
    }

    /// Port given as a `host:port` suffix, if any.
    pub fn port(&self) -> Option<u16> {
        self.host
            .split_once(':')
            .and_then(|(_, port)| port.parse().ok())
    }

    pub fn expose_secret(&self) -> &str {
        self.secret.expose_secret()
    }
}

impl fmt::Debug for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConnection")
            .field("schema", &self.schema)
            .field("host", &self.host)
            .field("user", &self.user)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Display for SourceConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}/{}", self.user, self.host, self.schema)
    }
}

/// One search-index node, as `scheme host port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkNode {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl SinkNode {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_connection_host_parts() {
        let conn = SourceConnection::new("dmoz", "db.local:3307", "elastico", "secret");
        assert_eq!(conn.hostname(), "db.local");
        assert_eq!(conn.port(), Some(3307));

        let conn = SourceConnection::new("dmoz", "127.0.0.1", "elastico", "secret");
        assert_eq!(conn.hostname(), "127.0.0.1");
        assert_eq!(conn.port(), None);
    }

    #[test]
    fn test_source_connection_debug_redacts_secret() {
        let conn = SourceConnection::new("dmoz", "127.0.0.1", "elastico", "hunter2");
        let rendered = format!("{:?}", conn);
        assert!(!rendered.contains("hunter2"));
        assert_eq!(conn.expose_secret(), "hunter2");
        assert_eq!(conn.to_string(), "elastico@127.0.0.1/dmoz");
    }

    #[test]
    fn test_sink_node_url() {
        assert_eq!(
            SinkNode::new("http", "127.0.0.1", 9200).url(),
            "http://127.0.0.1:9200"
        );
    }
}
