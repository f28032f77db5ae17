//! In-Memory Datastore
//!
//! Record tables behind one `RwLock` each, giving single-record-atomic reads
//! and writes. Updates are last-writer-wins; there is no revision tracking.

use crate::domain::ports::Datastore;
use crate::domain::volume::{ControllerInfo, ReplicaInfo, SettingsInfo, VolumeInfo};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory implementation of the [`Datastore`] port
#[derive(Debug, Default)]
pub struct MemoryDatastore {
    volumes: RwLock<BTreeMap<String, VolumeInfo>>,
    /// Keyed by (volume name, replica name)
    replicas: RwLock<BTreeMap<(String, String), ReplicaInfo>>,
    controllers: RwLock<BTreeMap<String, ControllerInfo>>,
    settings: RwLock<Option<SettingsInfo>>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove a volume record and its replica/controller records.
    ///
    /// Maintenance helper; reconciliation itself leaves a deleted tombstone
    /// in place.
    pub fn purge_volume(&self, name: &str) {
        self.volumes.write().remove(name);
        self.replicas.write().retain(|(volume, _), _| volume != name);
        self.controllers.write().remove(name);
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn create_volume(&self, volume: &VolumeInfo) -> Result<()> {
        let mut volumes = self.volumes.write();
        if volumes.contains_key(&volume.name) {
            return Err(Error::Datastore(format!(
                "volume {} already exists",
                volume.name
            )));
        }
        volumes.insert(volume.name.clone(), volume.clone());
        Ok(())
    }

    async fn get_volume(&self, name: &str) -> Result<Option<VolumeInfo>> {
        Ok(self.volumes.read().get(name).cloned())
    }

    async fn list_volumes(&self) -> Result<BTreeMap<String, VolumeInfo>> {
        Ok(self.volumes.read().clone())
    }

    async fn update_volume(&self, volume: &VolumeInfo) -> Result<()> {
        let mut volumes = self.volumes.write();
        if !volumes.contains_key(&volume.name) {
            return Err(Error::Datastore(format!(
                "cannot update nonexistent volume {}",
                volume.name
            )));
        }
        volumes.insert(volume.name.clone(), volume.clone());
        Ok(())
    }

    async fn get_settings(&self) -> Result<Option<SettingsInfo>> {
        Ok(self.settings.read().clone())
    }

    async fn create_settings(&self, settings: &SettingsInfo) -> Result<()> {
        let mut slot = self.settings.write();
        if slot.is_some() {
            return Err(Error::Datastore("settings record already exists".into()));
        }
        *slot = Some(settings.clone());
        Ok(())
    }

    async fn update_settings(&self, settings: &SettingsInfo) -> Result<()> {
        let mut slot = self.settings.write();
        if slot.is_none() {
            return Err(Error::Datastore(
                "cannot update nonexistent settings record".into(),
            ));
        }
        *slot = Some(settings.clone());
        Ok(())
    }

    async fn get_volume_replica(
        &self,
        volume_name: &str,
        replica_name: &str,
    ) -> Result<Option<ReplicaInfo>> {
        Ok(self
            .replicas
            .read()
            .get(&(volume_name.to_string(), replica_name.to_string()))
            .cloned())
    }

    async fn update_volume_replica(&self, replica: &ReplicaInfo) -> Result<()> {
        self.replicas.write().insert(
            (replica.volume_name.clone(), replica.name.clone()),
            replica.clone(),
        );
        Ok(())
    }

    async fn delete_volume_replica(&self, volume_name: &str, replica_name: &str) -> Result<()> {
        self.replicas
            .write()
            .remove(&(volume_name.to_string(), replica_name.to_string()));
        Ok(())
    }

    async fn list_volume_replicas(
        &self,
        volume_name: &str,
    ) -> Result<BTreeMap<String, ReplicaInfo>> {
        Ok(self
            .replicas
            .read()
            .iter()
            .filter(|((volume, _), _)| volume == volume_name)
            .map(|((_, name), replica)| (name.clone(), replica.clone()))
            .collect())
    }

    async fn get_volume_controller(&self, volume_name: &str) -> Result<Option<ControllerInfo>> {
        Ok(self.controllers.read().get(volume_name).cloned())
    }

    async fn update_volume_controller(&self, controller: &ControllerInfo) -> Result<()> {
        self.controllers
            .write()
            .insert(controller.volume_name.clone(), controller.clone());
        Ok(())
    }

    async fn delete_volume_controller(&self, volume_name: &str) -> Result<()> {
        self.controllers.write().remove(volume_name);
        Ok(())
    }
}
