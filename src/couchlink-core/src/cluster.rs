use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::transport::{fetch, url_encode, Method, SharedTransport};

/// Default node-local port exposing per-node administration
pub const LOCAL_CLUSTER_NODE_PORT: u16 = 5986;

/// Handle to a single node of a deployment.
///
/// Single-node (pre-2.0) servers yield a synthetic node without a name.
#[derive(Clone)]
pub struct NodeConnection {
    transport: SharedTransport,
    port: u16,
    node_name: Option<String>,
}

impl NodeConnection {
    pub fn new(port: u16, node_name: Option<String>, transport: SharedTransport) -> Self {
        Self {
            transport,
            port,
            node_name,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    fn config_path(&self) -> String {
        match &self.node_name {
            Some(name) => format!("/_node/{}/_config", url_encode(name)),
            None => "/_config".to_string(),
        }
    }

    /// Full server configuration of this node
    pub async fn config(&self) -> Result<Value> {
        let path = self.config_path();
        let response = fetch(self.transport.as_ref(), &path, Method::Get, None, true).await?;
        if !response.is_object() {
            return Err(Error::BadResponse);
        }
        Ok(response)
    }

    pub async fn config_value(&self, section: &str, key: &str) -> Result<Value> {
        let path = format!(
            "{}/{}/{}",
            self.config_path(),
            url_encode(section),
            url_encode(key)
        );
        fetch(self.transport.as_ref(), &path, Method::Get, None, true).await
    }
}

impl fmt::Debug for NodeConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeConnection")
            .field("port", &self.port)
            .field("node_name", &self.node_name)
            .finish()
    }
}

/// Ordered set of nodes in a clustered (2.0+) deployment
#[derive(Clone)]
pub struct ClusterConnection {
    transport: SharedTransport,
    port: u16,
    nodes: Vec<NodeConnection>,
}

impl ClusterConnection {
    /// Discover the cluster members via `/_membership`, keeping server order
    #[tracing::instrument(skip(transport))]
    pub async fn connect(port: u16, transport: SharedTransport) -> Result<Self> {
        let response = fetch(transport.as_ref(), "/_membership", Method::Get, None, true).await?;

        let names = response
            .get("all_nodes")
            .and_then(Value::as_array)
            .ok_or(Error::BadResponse)?;

        let mut nodes = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_str().ok_or(Error::BadResponse)?;
            nodes.push(NodeConnection::new(
                port,
                Some(name.to_string()),
                transport.clone(),
            ));
        }

        tracing::debug!("Discovered {} cluster node(s)", nodes.len());

        Ok(Self {
            transport,
            port,
            nodes,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport(&self) -> &SharedTransport {
        &self.transport
    }

    pub fn nodes(&self) -> &[NodeConnection] {
        &self.nodes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NodeConnection> {
        self.nodes.iter()
    }

    pub fn first(&self) -> Option<&NodeConnection> {
        self.nodes.first()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<'a> IntoIterator for &'a ClusterConnection {
    type Item = &'a NodeConnection;
    type IntoIter = std::slice::Iter<'a, NodeConnection>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

impl IntoIterator for ClusterConnection {
    type Item = NodeConnection;
    type IntoIter = std::vec::IntoIter<NodeConnection>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

impl fmt::Debug for ClusterConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConnection")
            .field("port", &self.port)
            .field("nodes", &self.nodes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::mock::MockTransport;
    use serde_json::json;

    #[tokio::test]
    async fn test_connect_keeps_membership_order() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/_membership",
            Ok(json!({
                "all_nodes": ["couchdb@node1", "couchdb@node2"],
                "cluster_nodes": ["couchdb@node1", "couchdb@node2"]
            })),
        );

        let cluster = ClusterConnection::connect(LOCAL_CLUSTER_NODE_PORT, mock.clone())
            .await
            .unwrap();

        let names: Vec<_> = cluster.iter().filter_map(|n| n.node_name()).collect();
        assert_eq!(names, vec!["couchdb@node1", "couchdb@node2"]);
        assert_eq!(cluster.first().unwrap().port(), 5986);
        assert!(mock.calls()[0].server_root);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_membership() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/_membership", Ok(json!({"nodes": []})));

        let err = ClusterConnection::connect(5986, mock.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadResponse);
    }

    #[tokio::test]
    async fn test_node_config_paths() {
        let mock = MockTransport::new();
        mock.respond(Method::Get, "/_config", Ok(json!({"httpd": {}})));
        mock.respond(
            Method::Get,
            "/_node/couchdb%40node1/_config/couchdb/uuid",
            Ok(json!("abc")),
        );

        let single = NodeConnection::new(5986, None, mock.clone());
        assert!(single.config().await.unwrap().get("httpd").is_some());

        let named = NodeConnection::new(5986, Some("couchdb@node1".into()), mock.clone());
        assert_eq!(named.config_value("couchdb", "uuid").await.unwrap(), json!("abc"));
    }

    #[tokio::test]
    async fn test_node_config_error_body_is_an_error() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/_node/couchdb%40node1/_config",
            Ok(json!({"error": "unauthorized", "reason": "You are not a server admin."})),
        );
        mock.respond(
            Method::Get,
            "/_node/couchdb%40node1/_config/couchdb/uuid",
            Ok(json!({"error": "nodedown", "reason": "progress not possible"})),
        );

        let node = NodeConnection::new(5986, Some("couchdb@node1".into()), mock.clone());
        let err = node.config().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.reason(), Some("You are not a server admin."));

        let err = node.config_value("couchdb", "uuid").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert_eq!(err.reason(), Some("progress not possible"));
    }

    #[tokio::test]
    async fn test_connect_propagates_server_error() {
        let mock = MockTransport::new();
        mock.respond(
            Method::Get,
            "/_membership",
            Err(Error::Server {
                status: Some(503),
                error: "service_unavailable".into(),
                reason: None,
            }),
        );

        let err = ClusterConnection::connect(5986, mock.clone()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
    }
}
