//! Node read with scale, hierarchical browse, and test connection.

use std::time::Instant;

use common::error::CResult;
use common::value::FieldValue;
use opcua::types::Variant;
use tracing::warn;

use crate::auth::Credentials;
use crate::pool::OpcuaPool;

pub struct BrowseNode {
    pub node_id: String,
    pub browse_name: String,
    pub namespace_index: u16,
    pub node_class: String,
    pub value: Option<FieldValue>,
    pub data_type: Option<String>,
    pub children: Vec<BrowseNode>,
}

pub struct OpcuaClient {
    pool: OpcuaPool,
}

impl Default for OpcuaClient {
    fn default() -> Self {
        Self::new()
    }
}

impl OpcuaClient {
    pub fn new() -> Self {
        OpcuaClient { pool: OpcuaPool::new() }
    }

    /// Fetches the node's current value, applying `scale`
    /// when the value is numeric and `scale != 1.0`. Non-numeric
    /// values pass through unchanged.
    pub async fn read_value(&self, endpoint: &str, node_id: &str, credentials: &Credentials, scale: f64) -> CResult<FieldValue> {
        let session = self.pool.get_or_connect(endpoint, credentials).await?;

        let node = match self.pool.cached_node(endpoint, node_id) {
            Some(node) => node,
            None => self.pool.cache_node(endpoint, node_id)?,
        };

        let session_for_blocking = session.clone();
        let result = tokio::task::spawn_blocking(move || session_for_blocking.read_raw_node(node))
            .await
            .map_err(|e| common::error::EngineError::transport(format!("opc ua read task panicked: {e}")))?;

        let variant = match result {
            Ok(v) => v,
            Err(e) => {
                self.pool.evict(endpoint);
                return Err(e);
            }
        };

        Ok(variant_to_field_value(variant, scale))
    }

    /// Descends up to `max_depth` levels from `root`
    /// (empty for the server root). Failures on a subtree are
    /// swallowed so sibling subtrees still return. Returns a single
    /// element: `root` itself, with `children` populated to the depth
    /// limit.
    pub async fn browse(&self, endpoint: &str, root: &str, max_depth: u32, credentials: &Credentials) -> CResult<Vec<BrowseNode>> {
        let session = self.pool.get_or_connect(endpoint, credentials).await?;
        let root = root.to_string();
        let node = tokio::task::spawn_blocking(move || {
            // The root has no parent browse result to draw a descriptor
            // from; OPC UA fixes its node class as Object regardless of
            // server, so that much can be synthesized.
            let descriptor = crate::session::BrowsedNode {
                node_id: if root.is_empty() { "i=84".to_string() } else { root.clone() },
                browse_name: "Root".to_string(),
                namespace_index: 0,
                node_class: "Object".to_string(),
            };
            browse_recursive(&session, descriptor, max_depth, 0)
        })
        .await
        .map_err(|e| common::error::EngineError::transport(format!("opc ua browse task panicked: {e}")))?;
        Ok(vec![node])
    }

    /// Opens a session, optionally reads one node, closes the session.
    pub async fn test_connection(
        &self,
        endpoint: &str,
        node_id: Option<&str>,
        credentials: &Credentials,
    ) -> (bool, u64, String, Option<FieldValue>) {
        let start = Instant::now();

        let session = match crate::session::OpcuaSession::connect(endpoint, credentials) {
            Ok(s) => s,
            Err(e) => return (false, start.elapsed().as_millis() as u64, e.to_string(), None),
        };

        let value = match node_id {
            Some(id) => match session.read_raw(id) {
                Ok(v) => Some(variant_to_field_value(v, 1.0)),
                Err(e) => {
                    session.close();
                    return (false, start.elapsed().as_millis() as u64, e.to_string(), None);
                }
            },
            None => None,
        };

        session.close();
        (true, start.elapsed().as_millis() as u64, String::new(), value)
    }
}

/// Builds the `BrowseNode` for `descriptor` itself, fetching its value
/// if it's a variable and its children if `depth < max_depth`.
fn browse_recursive(session: &crate::session::OpcuaSession, descriptor: crate::session::BrowsedNode, max_depth: u32, depth: u32) -> BrowseNode {
    let is_variable = descriptor.node_class.contains("Variable");
    let (value, data_type) = if is_variable {
        match session.read_raw(&descriptor.node_id) {
            Ok(v) => {
                let tag = format!("{v:?}");
                (Some(variant_to_field_value(v, 1.0)), Some(tag))
            }
            Err(_) => (None, None),
        }
    } else {
        (None, None)
    };

    let children = if depth < max_depth {
        match session.browse_children(&descriptor.node_id) {
            Ok(kids) => kids
                .into_iter()
                .map(|child| browse_recursive(session, child, max_depth, depth + 1))
                .collect(),
            Err(e) => {
                warn!(node_id = %descriptor.node_id, error = %e, "opc ua browse subtree failed, skipping");
                vec![]
            }
        }
    } else {
        vec![]
    };

    BrowseNode {
        node_id: descriptor.node_id,
        browse_name: descriptor.browse_name,
        namespace_index: descriptor.namespace_index,
        node_class: descriptor.node_class,
        value,
        data_type,
        children,
    }
}

fn variant_to_field_value(variant: Variant, scale: f64) -> FieldValue {
    let value = match variant {
        Variant::Boolean(b) => FieldValue::Bool(b),
        Variant::Byte(v) => FieldValue::Int(v as i64),
        Variant::SByte(v) => FieldValue::Int(v as i64),
        Variant::Int16(v) => FieldValue::Int(v as i64),
        Variant::UInt16(v) => FieldValue::Int(v as i64),
        Variant::Int32(v) => FieldValue::Int(v as i64),
        Variant::UInt32(v) => FieldValue::Int(v as i64),
        Variant::Int64(v) => FieldValue::Int(v),
        Variant::UInt64(v) => FieldValue::Int(v as i64),
        Variant::Float(v) => FieldValue::Float(v as f64),
        Variant::Double(v) => FieldValue::Float(v),
        Variant::String(s) => FieldValue::String(s.to_string()),
        other => FieldValue::String(format!("{other:?}")),
    };

    if scale != 1.0 {
        if let Some(numeric) = value.as_f64() {
            return FieldValue::Float(numeric * scale);
        }
    }
    value
}
