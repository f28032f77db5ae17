//! Cluster node tracking
//!
//! The registry knows which nodes exist, which one is this process's node,
//! and supports drawing a candidate node for placing new volumes.

pub mod registry;

pub use registry::{Node, NodeRegistry, DEFAULT_NODE_PRIORITY};
