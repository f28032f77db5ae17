//! Node Registry
//!
//! Tracks cluster members and the local node's registration. Volume creation
//! draws an owning node from here; selection is uniform random over the
//! registered candidate set, which is deterministic under test by
//! registering a fixed set.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Priority assigned when registration passes the negative sentinel
pub const DEFAULT_NODE_PRIORITY: i64 = 0;

// =============================================================================
// Node
// =============================================================================

/// A cluster member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Node ID, unique within the cluster
    pub id: String,
    /// Management address of the node
    pub address: String,
    /// Placement priority; higher wins ties in future policies, unused by
    /// uniform random selection
    pub priority: i64,
    /// Registration timestamp
    pub registered_at: DateTime<Utc>,
}

// =============================================================================
// Node Registry
// =============================================================================

/// Registry of cluster nodes, including the local node
pub struct NodeRegistry {
    local_id: String,
    local_address: String,
    nodes: RwLock<HashMap<String, Node>>,
}

impl NodeRegistry {
    /// Create a registry that knows the local node's identity.
    ///
    /// The local node is not a placement candidate until `register_node`
    /// runs.
    pub fn new(local_id: impl Into<String>, local_address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            local_id: local_id.into(),
            local_address: local_address.into(),
            nodes: RwLock::new(HashMap::new()),
        })
    }

    /// Register the local node.
    ///
    /// A negative priority is the first-run sentinel and maps to
    /// [`DEFAULT_NODE_PRIORITY`]. Re-registration updates the existing
    /// entry's priority.
    pub fn register_node(&self, priority: i64) -> Result<()> {
        let priority = if priority < 0 {
            DEFAULT_NODE_PRIORITY
        } else {
            priority
        };
        let mut nodes = self.nodes.write();
        match nodes.get_mut(&self.local_id) {
            Some(node) => node.priority = priority,
            None => {
                nodes.insert(
                    self.local_id.clone(),
                    Node {
                        id: self.local_id.clone(),
                        address: self.local_address.clone(),
                        priority,
                        registered_at: Utc::now(),
                    },
                );
                info!(node = %self.local_id, priority, "registered local node");
            }
        }
        Ok(())
    }

    /// Register a remote candidate node
    pub fn register_candidate(&self, node: Node) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&node.id) {
            return Err(Error::NodeAlreadyRegistered { node_id: node.id });
        }
        info!(node = %node.id, "registered candidate node");
        nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Remove a node from the candidate set
    pub fn deregister(&self, node_id: &str) -> Result<()> {
        let mut nodes = self.nodes.write();
        if nodes.remove(node_id).is_none() {
            return Err(Error::NodeNotFound {
                node_id: node_id.to_string(),
            });
        }
        Ok(())
    }

    /// Look up a node by ID
    pub fn get_node(&self, node_id: &str) -> Option<Node> {
        self.nodes.read().get(node_id).cloned()
    }

    /// The local node's registration
    pub fn current_node(&self) -> Result<Node> {
        self.get_node(&self.local_id).ok_or_else(|| Error::NodeNotFound {
            node_id: self.local_id.clone(),
        })
    }

    /// ID of this process's node
    pub fn current_node_id(&self) -> &str {
        &self.local_id
    }

    /// All registered node IDs, sorted
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Draw one candidate node for placing a new volume.
    ///
    /// Uniform random over the registered set; errors when no node is
    /// registered.
    pub fn get_random_node(&self) -> Result<Node> {
        let nodes = self.nodes.read();
        let mut rng = rand::thread_rng();
        nodes
            .values()
            .choose(&mut rng)
            .cloned()
            .ok_or(Error::NoNodesAvailable)
    }
}
