//! Session pool keyed by normalized endpoint, plus the node-handle
//! cache keyed by `(endpoint, node_id)`. A `DashMap` per map instead of
//! one lock-guarded dict, so sessions on different endpoints never
//! contend.

use std::sync::Arc;

use common::error::CResult;
use dashmap::DashMap;
use opcua::types::NodeId;
use std::str::FromStr;
use tracing::{info, warn};

use crate::auth::Credentials;
use crate::endpoint::normalize_endpoint;
use crate::session::OpcuaSession;

#[derive(Default)]
pub struct OpcuaPool {
    sessions: DashMap<String, Arc<OpcuaSession>>,
    nodes: DashMap<(String, String), NodeId>,
}

impl OpcuaPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_connect(&self, endpoint: &str, credentials: &Credentials) -> CResult<Arc<OpcuaSession>> {
        let key = normalize_endpoint(endpoint);
        if let Some(existing) = self.sessions.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }

        let key_for_blocking = key.clone();
        let credentials = credentials.clone();
        let session = tokio::task::spawn_blocking(move || OpcuaSession::connect(&key_for_blocking, &credentials))
            .await
            .map_err(|e| common::error::EngineError::transport(format!("opc ua connect task panicked: {e}")))??;

        let handle = Arc::new(session);
        self.sessions.insert(key.clone(), Arc::clone(&handle));
        info!(endpoint = %key, "opc ua session established");
        Ok(handle)
    }

    /// Evicts the session (and its cached node handles) after an I/O
    /// failure so the next call reconnects.
    pub fn evict(&self, endpoint: &str) {
        let key = normalize_endpoint(endpoint);
        if let Some((_, session)) = self.sessions.remove(&key) {
            session.close();
            self.nodes.retain(|(ep, _), _| ep != &key);
            warn!(endpoint = %key, "opc ua session evicted after transport error");
        }
    }

    pub fn cached_node(&self, endpoint: &str, node_id: &str) -> Option<NodeId> {
        let key = normalize_endpoint(endpoint);
        self.nodes.get(&(key, node_id.to_string())).map(|n| n.value().clone())
    }

    pub fn cache_node(&self, endpoint: &str, node_id: &str) -> CResult<NodeId> {
        let key = normalize_endpoint(endpoint);
        let parsed = NodeId::from_str(node_id)
            .map_err(|_| common::error::EngineError::config(format!("invalid opc ua node id: {node_id}")))?;
        self.nodes.insert((key, node_id.to_string()), parsed.clone());
        Ok(parsed)
    }
}
