//! Domain Ports - Core trait definitions for the volume manager
//!
//! These traits define the boundaries between the control plane and its
//! external collaborators: the durable datastore, the process orchestrator,
//! and the engine API. Adapters implement these traits to provide concrete
//! functionality.

use crate::domain::volume::{ControllerInfo, ReplicaInfo, SettingsInfo, VolumeInfo};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Datastore Port
// =============================================================================

/// Port for the durable source of truth.
///
/// Get calls return `Ok(None)` for absent records rather than an error;
/// update calls error when the referenced record does not exist. Reads and
/// writes are atomic at single-record granularity. There is no optimistic
/// versioning: concurrent read-modify-write cycles against the same record
/// are last-writer-wins.
#[async_trait]
pub trait Datastore: Send + Sync + std::fmt::Debug {
    /// Create a new volume record; errors if the name is taken
    async fn create_volume(&self, volume: &VolumeInfo) -> Result<()>;

    /// Get a volume record by name
    async fn get_volume(&self, name: &str) -> Result<Option<VolumeInfo>>;

    /// List all volume records, keyed by name
    async fn list_volumes(&self) -> Result<BTreeMap<String, VolumeInfo>>;

    /// Overwrite an existing volume record
    async fn update_volume(&self, volume: &VolumeInfo) -> Result<()>;

    /// Get the singleton settings record
    async fn get_settings(&self) -> Result<Option<SettingsInfo>>;

    /// Create the singleton settings record; errors if present
    async fn create_settings(&self, settings: &SettingsInfo) -> Result<()>;

    /// Overwrite the settings record
    async fn update_settings(&self, settings: &SettingsInfo) -> Result<()>;

    /// Get one replica record of a volume
    async fn get_volume_replica(
        &self,
        volume_name: &str,
        replica_name: &str,
    ) -> Result<Option<ReplicaInfo>>;

    /// Create or overwrite a replica record
    async fn update_volume_replica(&self, replica: &ReplicaInfo) -> Result<()>;

    /// Delete a replica record; absent records are ignored
    async fn delete_volume_replica(&self, volume_name: &str, replica_name: &str) -> Result<()>;

    /// List replica records of a volume, keyed by replica name
    async fn list_volume_replicas(&self, volume_name: &str)
        -> Result<BTreeMap<String, ReplicaInfo>>;

    /// Get the controller record of a volume
    async fn get_volume_controller(&self, volume_name: &str) -> Result<Option<ControllerInfo>>;

    /// Create or overwrite the controller record of a volume
    async fn update_volume_controller(&self, controller: &ControllerInfo) -> Result<()>;

    /// Delete the controller record of a volume; absent records are ignored
    async fn delete_volume_controller(&self, volume_name: &str) -> Result<()>;
}

// =============================================================================
// Orchestrator Port
// =============================================================================

/// Port for engine/replica process lifecycle on cluster nodes.
///
/// Consumed only by the per-volume reconciliation worker, never by the
/// facade. All operations must be idempotent: creating an existing process
/// or stopping a stopped one succeeds without effect, so a reconciliation
/// step is safe to re-run.
#[async_trait]
pub trait Orchestrator: Send + Sync + std::fmt::Debug {
    /// Create a replica process for a volume; returns its record
    async fn create_replica(&self, volume: &VolumeInfo, replica_name: &str)
        -> Result<ReplicaInfo>;

    /// Start a previously created replica process
    async fn start_replica(&self, volume_name: &str, replica_name: &str) -> Result<ReplicaInfo>;

    /// Stop a replica process
    async fn stop_replica(&self, volume_name: &str, replica_name: &str) -> Result<()>;

    /// Delete a replica process and its on-disk data
    async fn delete_replica(&self, volume_name: &str, replica_name: &str) -> Result<()>;

    /// Start the engine process for a volume on a node, wired to the given
    /// replica addresses; returns the controller record
    async fn start_engine(
        &self,
        volume: &VolumeInfo,
        node_id: &str,
        replica_addresses: &[String],
    ) -> Result<ControllerInfo>;

    /// Stop the engine process of a volume
    async fn stop_engine(&self, volume_name: &str) -> Result<()>;

    /// Delete the engine process of a volume
    async fn delete_engine(&self, volume_name: &str) -> Result<()>;
}

// =============================================================================
// Engine API Port
// =============================================================================

/// Backup metadata as recorded by the backup target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Volume the backup was taken from
    pub volume_name: String,
    /// Size of the backed-up volume in bytes; supersedes any requested size
    /// when restoring
    pub volume_size: u64,
    /// Snapshot the backup was taken from
    pub snapshot_name: String,
    /// When the backup was taken (RFC 3339)
    pub created: String,
}

/// Per-volume RPC handle to a running storage-engine process
#[async_trait]
pub trait EngineClient: Send + Sync + std::fmt::Debug {
    /// Name of the volume this client talks to
    fn name(&self) -> &str;

    /// Whether the engine knows the named snapshot
    async fn snapshot_exists(&self, snapshot_name: &str) -> Result<bool>;

    /// Trigger removal of obsolete snapshot data; safe to call repeatedly
    async fn snapshot_purge(&self) -> Result<()>;

    /// Back up an existing snapshot to the given target
    async fn snapshot_backup(&self, snapshot_name: &str, backup_target: &str) -> Result<()>;

    /// Remove one replica from the engine's live topology by address
    async fn replica_remove(&self, address: &str) -> Result<()>;
}

/// Factory for engine clients plus backup-target metadata lookups
#[async_trait]
pub trait EngineClientCollection: Send + Sync + std::fmt::Debug {
    /// Build a client for the volume's running engine
    fn client_for(&self, volume_name: &str, controller: &ControllerInfo)
        -> Result<Arc<dyn EngineClient>>;

    /// Resolve backup metadata from a backup locator
    async fn get_backup(&self, locator: &str) -> Result<BackupInfo>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type DatastoreRef = Arc<dyn Datastore>;
pub type OrchestratorRef = Arc<dyn Orchestrator>;
pub type EngineClientRef = Arc<dyn EngineClient>;
pub type EngineClientCollectionRef = Arc<dyn EngineClientCollection>;
