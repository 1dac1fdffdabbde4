//! Thin bridge to the `opcua` crate's synchronous client, the
//! real-world pure-Rust OPC UA implementation. Hand-rolling the
//! binary protocol (secure channels, chunking, discovery) the way the
//! Modbus client hand-rolls MBAP framing would be out of proportion to
//! this engine. Every call into `opcua` is funneled through
//! `spawn_blocking` since its client runs its own synchronous event
//! loop.

use std::str::FromStr;
use std::sync::{Arc, RwLock};

use common::error::{CResult, EngineError};
use opcua::client::prelude::{
    Client, ClientBuilder, IdentityToken, MessageSecurityMode, ReadValueId, SecurityPolicy, Session,
    TimestampsToReturn,
};
use opcua::types::{DataValue, NodeId, Variant};

use crate::auth::{AuthType, Credentials};

pub struct OpcuaSession {
    // `Client` owns the connection's cryptographic/event-loop state;
    // it must outlive every `Session` obtained from it.
    _client: Client,
    session: Arc<RwLock<Session>>,
}

impl OpcuaSession {
    pub fn connect(endpoint: &str, credentials: &Credentials) -> CResult<Self> {
        let endpoint = endpoint.to_string();
        let mut client = ClientBuilder::new()
            .application_name("neuract-agent")
            .application_uri("urn:neuract-agent")
            .trust_server_certs(true)
            .create_sample_keypair(true)
            .session_retry_limit(1)
            .client()
            .ok_or_else(|| EngineError::transport("failed to build opc ua client"))?;

        let identity = match credentials.effective_auth_type() {
            AuthType::Anonymous => IdentityToken::Anonymous,
            AuthType::UserPassword => IdentityToken::UserName(
                credentials.username.clone().unwrap_or_default(),
                credentials.password.clone().unwrap_or_default(),
            ),
        };

        let session = client
            .connect_to_endpoint(
                (
                    endpoint.as_ref(),
                    SecurityPolicy::None.to_str(),
                    MessageSecurityMode::None,
                    identity.clone(),
                ),
                identity,
            )
            .map_err(|e| EngineError::transport(format!("opc ua connect to {endpoint} failed: {e}")))?;

        Ok(OpcuaSession {
            _client: client,
            session,
        })
    }

    pub fn read_raw(&self, node_id: &str) -> CResult<Variant> {
        let node = NodeId::from_str(node_id)
            .map_err(|_| EngineError::config(format!("invalid opc ua node id: {node_id}")))?;
        self.read_raw_node(node)
    }

    /// Same as [`Self::read_raw`] but takes an already-resolved `NodeId`,
    /// skipping the string parse. Used on the cache hit path.
    pub fn read_raw_node(&self, node: NodeId) -> CResult<Variant> {
        let node_id_display = node.to_string();
        let session = self
            .session
            .read()
            .map_err(|_| EngineError::transport("opc ua session lock poisoned"))?;

        let results = session
            .read(
                &[ReadValueId::from(node)],
                TimestampsToReturn::Neither,
                0.0,
            )
            .map_err(|e| EngineError::transport(format!("opc ua read failed: {e}")))?;

        let value: &DataValue = results
            .first()
            .ok_or_else(|| EngineError::transport("opc ua server returned no results"))?;

        value
            .value
            .clone()
            .ok_or_else(|| EngineError::decode(format!("opc ua node {node_id_display} has no value")))
    }

    pub fn close(&self) {
        if let Ok(mut session) = self.session.write() {
            let _ = session.disconnect();
        }
    }

    /// One level of browse beneath `node_id` (empty string for the
    /// server's root). Used by [`crate::client::OpcuaClient::browse`]
    /// to descend recursively.
    pub fn browse_children(&self, node_id: &str) -> CResult<Vec<BrowsedNode>> {
        let root = if node_id.is_empty() {
            NodeId::root_folder_id()
        } else {
            NodeId::from_str(node_id)
                .map_err(|_| EngineError::config(format!("invalid opc ua node id: {node_id}")))?
        };

        let session = self
            .session
            .read()
            .map_err(|_| EngineError::transport("opc ua session lock poisoned"))?;

        let description = opcua::client::prelude::BrowseDescription {
            node_id: root,
            browse_direction: opcua::types::BrowseDirection::Forward,
            reference_type_id: opcua::types::ReferenceTypeId::HierarchicalReferences.into(),
            include_subtypes: true,
            node_class_mask: 0,
            result_mask: 0x3F,
        };

        let results = session
            .browse(&[description])
            .map_err(|e| EngineError::transport(format!("opc ua browse failed: {e}")))?
            .unwrap_or_default();

        let mut out = Vec::new();
        for result in results {
            for reference in result.references.unwrap_or_default() {
                out.push(BrowsedNode {
                    node_id: reference.node_id.node_id.to_string(),
                    browse_name: reference.browse_name.name.to_string(),
                    namespace_index: reference.browse_name.namespace_index,
                    node_class: format!("{:?}", reference.node_class),
                });
            }
        }
        Ok(out)
    }
}

/// One entry of a browse result.
pub struct BrowsedNode {
    pub node_id: String,
    pub browse_name: String,
    pub namespace_index: u16,
    pub node_class: String,
}
