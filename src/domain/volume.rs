//! Durable volume records
//!
//! These types mirror what the datastore persists: the volume record with its
//! desired/observed state split, replica and controller records, and the
//! singleton settings record. All mutations go through read-modify-write
//! cycles issued by the volume manager facade.

use serde::{Deserialize, Serialize};

// =============================================================================
// Volume State
// =============================================================================

/// Lifecycle state of a volume.
///
/// `state` reflects what was last observed by reconciliation; `desire_state`
/// is the controller's target. The two are independent axes and the
/// per-volume worker is responsible for driving one toward the other.
///
/// Observed transitions: `Created -> Detached <-> {Healthy, Degraded} -> Fault`,
/// with `Deleted` reachable from any state as a desired target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Created,
    Detached,
    Healthy,
    Degraded,
    Fault,
    Deleted,
}

impl std::fmt::Display for VolumeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VolumeState::Created => write!(f, "created"),
            VolumeState::Detached => write!(f, "detached"),
            VolumeState::Healthy => write!(f, "healthy"),
            VolumeState::Degraded => write!(f, "degraded"),
            VolumeState::Fault => write!(f, "fault"),
            VolumeState::Deleted => write!(f, "deleted"),
        }
    }
}

// =============================================================================
// Recurring Jobs
// =============================================================================

/// Task a recurring job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringTask {
    Snapshot,
    Backup,
}

/// A named snapshot/backup schedule attached to a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurringJob {
    /// Schedule name, unique within the volume
    pub name: String,
    /// What the schedule does
    pub task: RecurringTask,
    /// Cron expression
    pub cron: String,
    /// How many snapshots/backups to retain
    pub retain: u32,
}

// =============================================================================
// Volume Record
// =============================================================================

/// Durable volume record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Immutable primary key
    pub name: String,

    // --- Spec (desired) ---
    /// Node responsible for converging this volume
    pub owner_id: String,
    /// Size in bytes
    pub size: u64,
    /// Backup locator this volume restores from, if any
    #[serde(default)]
    pub from_backup: Option<String>,
    /// Desired replica count
    pub number_of_replicas: u32,
    /// Seconds before a failed replica is considered unsalvageable
    pub stale_replica_timeout: u32,
    /// Target state the reconciler drives toward
    pub desire_state: VolumeState,
    /// Snapshot/backup schedules, in user-supplied order
    #[serde(default)]
    pub recurring_jobs: Vec<RecurringJob>,
    /// Node the volume is currently meant to be attached to; None when detached
    #[serde(default)]
    pub node_id: Option<String>,

    // --- Status (observed) ---
    /// Last observed state
    pub state: VolumeState,
    /// Creation timestamp (RFC 3339)
    pub created: String,
}

impl VolumeInfo {
    /// Cross-field consistency validation, beyond size parsing.
    ///
    /// Used by create-by-spec before adopting an out-of-band record.
    pub fn validate(&self) -> crate::error::Result<()> {
        let fail = |reason: &str| {
            Err(crate::error::Error::VolumeValidation {
                name: self.name.clone(),
                reason: reason.to_string(),
            })
        };

        if self.name.is_empty() {
            return fail("volume name is empty");
        }
        if self.size == 0 {
            return fail("size must be positive");
        }
        if self.number_of_replicas == 0 {
            return fail("number of replicas must be at least 1");
        }
        if self.owner_id.is_empty() {
            return fail("owner node is not set");
        }
        if matches!(self.desire_state, VolumeState::Healthy) && self.node_id.is_none() {
            return fail("attached volume has no target node");
        }
        Ok(())
    }
}

// =============================================================================
// Replica and Controller Records
// =============================================================================

/// Durable replica record, keyed by volume + name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub name: String,
    pub volume_name: String,
    /// Node hosting the replica process
    pub node_id: String,
    /// Data-path address of the replica process
    pub address: String,
    /// None = healthy; Some(timestamp) = faulted at that time
    #[serde(default)]
    pub failed_at: Option<String>,
    /// Whether the replica process is currently running
    pub running: bool,
}

impl ReplicaInfo {
    /// A replica is healthy when it carries no fault marker.
    pub fn is_healthy(&self) -> bool {
        self.failed_at.is_none()
    }
}

/// Durable controller (engine frontend) record for an attached volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerInfo {
    pub name: String,
    pub volume_name: String,
    /// Node the engine process runs on
    pub node_id: String,
    /// RPC address of the engine process
    pub address: String,
    pub running: bool,
}

// =============================================================================
// Settings
// =============================================================================

/// Singleton durable settings record.
///
/// Read-or-create-default semantics: an absent record is created empty on
/// first read, then re-read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsInfo {
    /// Default backup target URL
    #[serde(default)]
    pub backup_target: String,
    /// Engine image to launch engine/replica processes with
    #[serde(default)]
    pub engine_image: String,
}
