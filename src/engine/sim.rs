//! Simulated Engine Adapter
//!
//! An in-process stand-in for the engine RPC surface: snapshots, backups,
//! and replica topology are tracked in shared tables. Used by the standalone
//! binary and the test suite; a production deployment plugs a real RPC
//! implementation into the same ports.

use crate::domain::ports::{BackupInfo, EngineClient, EngineClientCollection};
use crate::domain::volume::ControllerInfo;
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Shared Engine State
// =============================================================================

/// Snapshot/backup tables shared by all simulated clients
#[derive(Debug, Default)]
struct EngineState {
    /// Snapshot names per volume
    snapshots: RwLock<BTreeMap<String, BTreeSet<String>>>,
    /// Backups by locator
    backups: RwLock<BTreeMap<String, BackupInfo>>,
    /// Replica addresses removed from each volume's topology
    removed_replicas: RwLock<BTreeMap<String, BTreeSet<String>>>,
    /// Purge invocations per volume
    purges: RwLock<BTreeMap<String, u64>>,
}

// =============================================================================
// Collection
// =============================================================================

/// Simulated implementation of the [`EngineClientCollection`] port
#[derive(Debug, Default)]
pub struct SimEngineCollection {
    state: Arc<EngineState>,
}

impl SimEngineCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a snapshot, as if the engine had taken one
    pub fn add_snapshot(&self, volume_name: &str, snapshot_name: &str) {
        self.state
            .snapshots
            .write()
            .entry(volume_name.to_string())
            .or_default()
            .insert(snapshot_name.to_string());
    }

    /// Seed backup metadata resolvable through `get_backup`
    pub fn add_backup(&self, locator: &str, backup: BackupInfo) {
        self.state.backups.write().insert(locator.to_string(), backup);
    }

    /// Replica addresses removed from a volume's topology so far
    pub fn removed_replicas(&self, volume_name: &str) -> Vec<String> {
        self.state
            .removed_replicas
            .read()
            .get(volume_name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// How many purge requests a volume's engine has seen
    pub fn purge_count(&self, volume_name: &str) -> u64 {
        self.state.purges.read().get(volume_name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EngineClientCollection for SimEngineCollection {
    fn client_for(
        &self,
        volume_name: &str,
        controller: &ControllerInfo,
    ) -> Result<Arc<dyn EngineClient>> {
        if !controller.running {
            return Err(Error::EngineNotRunning {
                name: volume_name.to_string(),
            });
        }
        Ok(Arc::new(SimEngineClient {
            volume_name: volume_name.to_string(),
            state: self.state.clone(),
        }))
    }

    async fn get_backup(&self, locator: &str) -> Result<BackupInfo> {
        self.state
            .backups
            .read()
            .get(locator)
            .cloned()
            .ok_or_else(|| Error::BackupLookup {
                locator: locator.to_string(),
                reason: "backup not found on target".into(),
            })
    }
}

// =============================================================================
// Client
// =============================================================================

/// Simulated per-volume engine client
#[derive(Debug)]
struct SimEngineClient {
    volume_name: String,
    state: Arc<EngineState>,
}

#[async_trait]
impl EngineClient for SimEngineClient {
    fn name(&self) -> &str {
        &self.volume_name
    }

    async fn snapshot_exists(&self, snapshot_name: &str) -> Result<bool> {
        Ok(self
            .state
            .snapshots
            .read()
            .get(&self.volume_name)
            .is_some_and(|set| set.contains(snapshot_name)))
    }

    async fn snapshot_purge(&self) -> Result<()> {
        *self
            .state
            .purges
            .write()
            .entry(self.volume_name.clone())
            .or_default() += 1;
        debug!(volume = %self.volume_name, "purged obsolete snapshot data");
        Ok(())
    }

    async fn snapshot_backup(&self, snapshot_name: &str, backup_target: &str) -> Result<()> {
        if !self.snapshot_exists(snapshot_name).await? {
            return Err(Error::SnapshotNotFound {
                volume: self.volume_name.clone(),
                snapshot: snapshot_name.to_string(),
            });
        }
        let locator = format!("{backup_target}?volume={}&backup={snapshot_name}", self.volume_name);
        let backup = BackupInfo {
            volume_name: self.volume_name.clone(),
            volume_size: 0,
            snapshot_name: snapshot_name.to_string(),
            created: crate::util::now(),
        };
        self.state.backups.write().insert(locator, backup);
        debug!(
            volume = %self.volume_name,
            snapshot = %snapshot_name,
            target = %backup_target,
            "backed up snapshot"
        );
        Ok(())
    }

    async fn replica_remove(&self, address: &str) -> Result<()> {
        self.state
            .removed_replicas
            .write()
            .entry(self.volume_name.clone())
            .or_default()
            .insert(address.to_string());
        debug!(volume = %self.volume_name, address = %address, "removed replica from topology");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn controller(running: bool) -> ControllerInfo {
        ControllerInfo {
            name: "vol-1-e".into(),
            volume_name: "vol-1".into(),
            node_id: "node-1".into(),
            address: "tcp://10.0.0.1:9501".into(),
            running,
        }
    }

    #[tokio::test]
    async fn test_client_requires_running_engine() {
        let engines = SimEngineCollection::new();
        assert_matches!(
            engines.client_for("vol-1", &controller(false)),
            Err(Error::EngineNotRunning { .. })
        );
        assert!(engines.client_for("vol-1", &controller(true)).is_ok());
    }

    #[tokio::test]
    async fn test_backup_requires_existing_snapshot() {
        let engines = SimEngineCollection::new();
        let client = engines.client_for("vol-1", &controller(true)).unwrap();

        assert_matches!(
            client.snapshot_backup("snap-1", "s3://backups").await,
            Err(Error::SnapshotNotFound { .. })
        );

        engines.add_snapshot("vol-1", "snap-1");
        client.snapshot_backup("snap-1", "s3://backups").await.unwrap();
    }

    #[tokio::test]
    async fn test_get_backup_resolves_seeded_metadata() {
        let engines = SimEngineCollection::new();
        engines.add_backup(
            "s3://backups?volume=vol-0&backup=snap-0",
            BackupInfo {
                volume_name: "vol-0".into(),
                volume_size: 40 << 30,
                snapshot_name: "snap-0".into(),
                created: crate::util::now(),
            },
        );

        let backup = engines
            .get_backup("s3://backups?volume=vol-0&backup=snap-0")
            .await
            .unwrap();
        assert_eq!(backup.volume_size, 40 << 30);

        assert_matches!(
            engines.get_backup("s3://backups?volume=missing").await,
            Err(Error::BackupLookup { .. })
        );
    }

    #[tokio::test]
    async fn test_purge_is_repeatable() {
        let engines = SimEngineCollection::new();
        let client = engines.client_for("vol-1", &controller(true)).unwrap();
        client.snapshot_purge().await.unwrap();
        client.snapshot_purge().await.unwrap();
        assert_eq!(engines.purge_count("vol-1"), 2);
    }
}
