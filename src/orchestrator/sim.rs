//! Simulated Process Orchestrator
//!
//! Tracks engine and replica "processes" as in-memory tables instead of
//! scheduling real containers. All operations are idempotent, matching the
//! [`Orchestrator`] port contract, so reconciliation steps can re-run
//! safely. Used by the standalone binary and the test suite.
//!
//! [`Orchestrator`]: crate::domain::ports::Orchestrator

use crate::domain::ports::Orchestrator;
use crate::domain::volume::{ControllerInfo, ReplicaInfo, VolumeInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use tracing::debug;

/// A replica process slot
#[derive(Debug, Clone)]
struct ReplicaProcess {
    info: ReplicaInfo,
}

/// Simulated implementation of the [`Orchestrator`] port
#[derive(Debug, Default)]
pub struct SimOrchestrator {
    /// Replica processes keyed by (volume name, replica name)
    replicas: RwLock<BTreeMap<(String, String), ReplicaProcess>>,
    /// Engine processes keyed by volume name
    engines: RwLock<BTreeMap<String, ControllerInfo>>,
    /// When set, process starts fail with this message (for fault injection)
    fail_starts: RwLock<Option<String>>,
}

impl SimOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent start/create operations fail, to exercise fault paths
    pub fn fail_starts_with(&self, reason: &str) {
        *self.fail_starts.write() = Some(reason.to_string());
    }

    /// Clear injected start failures
    pub fn heal(&self) {
        *self.fail_starts.write() = None;
    }

    fn check_injected_failure(&self) -> Result<()> {
        if let Some(reason) = self.fail_starts.read().clone() {
            return Err(Error::Orchestrator(reason));
        }
        Ok(())
    }

    /// Whether a volume's engine process is currently running
    pub fn engine_running(&self, volume_name: &str) -> bool {
        self.engines
            .read()
            .get(volume_name)
            .is_some_and(|engine| engine.running)
    }

    /// Names of replica processes currently running for a volume
    pub fn running_replicas(&self, volume_name: &str) -> Vec<String> {
        self.replicas
            .read()
            .iter()
            .filter(|((volume, _), process)| volume == volume_name && process.info.running)
            .map(|((_, name), _)| name.clone())
            .collect()
    }
}

#[async_trait]
impl Orchestrator for SimOrchestrator {
    async fn create_replica(
        &self,
        volume: &VolumeInfo,
        replica_name: &str,
    ) -> Result<ReplicaInfo> {
        self.check_injected_failure()?;
        let key = (volume.name.clone(), replica_name.to_string());
        let mut replicas = self.replicas.write();
        if let Some(existing) = replicas.get(&key) {
            // Idempotent: re-creating yields the existing process
            return Ok(existing.info.clone());
        }
        let info = ReplicaInfo {
            name: replica_name.to_string(),
            volume_name: volume.name.clone(),
            node_id: volume.owner_id.clone(),
            address: format!("tcp://{}:9502/{}", volume.owner_id, replica_name),
            failed_at: None,
            running: false,
        };
        replicas.insert(key, ReplicaProcess { info: info.clone() });
        debug!(volume = %volume.name, replica = %replica_name, "created replica process");
        Ok(info)
    }

    async fn start_replica(&self, volume_name: &str, replica_name: &str) -> Result<ReplicaInfo> {
        self.check_injected_failure()?;
        let key = (volume_name.to_string(), replica_name.to_string());
        let mut replicas = self.replicas.write();
        let process = replicas.get_mut(&key).ok_or_else(|| {
            Error::Orchestrator(format!(
                "no replica process {replica_name} for volume {volume_name}"
            ))
        })?;
        process.info.running = true;
        Ok(process.info.clone())
    }

    async fn stop_replica(&self, volume_name: &str, replica_name: &str) -> Result<()> {
        let key = (volume_name.to_string(), replica_name.to_string());
        if let Some(process) = self.replicas.write().get_mut(&key) {
            process.info.running = false;
        }
        Ok(())
    }

    async fn delete_replica(&self, volume_name: &str, replica_name: &str) -> Result<()> {
        self.replicas
            .write()
            .remove(&(volume_name.to_string(), replica_name.to_string()));
        debug!(volume = %volume_name, replica = %replica_name, "deleted replica process");
        Ok(())
    }

    async fn start_engine(
        &self,
        volume: &VolumeInfo,
        node_id: &str,
        replica_addresses: &[String],
    ) -> Result<ControllerInfo> {
        self.check_injected_failure()?;
        if replica_addresses.is_empty() {
            return Err(Error::Orchestrator(format!(
                "cannot start engine for volume {} without replicas",
                volume.name
            )));
        }
        let controller = ControllerInfo {
            name: format!("{}-e", volume.name),
            volume_name: volume.name.clone(),
            node_id: node_id.to_string(),
            address: format!("tcp://{node_id}:9501/{}", volume.name),
            running: true,
        };
        self.engines
            .write()
            .insert(volume.name.clone(), controller.clone());
        debug!(
            volume = %volume.name,
            node = %node_id,
            replicas = replica_addresses.len(),
            "started engine process"
        );
        Ok(controller)
    }

    async fn stop_engine(&self, volume_name: &str) -> Result<()> {
        if let Some(engine) = self.engines.write().get_mut(volume_name) {
            engine.running = false;
        }
        Ok(())
    }

    async fn delete_engine(&self, volume_name: &str) -> Result<()> {
        self.engines.write().remove(volume_name);
        debug!(volume = %volume_name, "deleted engine process");
        Ok(())
    }
}
