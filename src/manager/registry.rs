//! Managed Volume Cache
//!
//! Concurrency-safe mapping from volume name to its live handle, with
//! atomic get-or-create semantics. The map lock covers only membership:
//! it is never held across a datastore round-trip or a delegated call into
//! a managed volume, so unrelated volumes never queue behind one slow
//! operation.

use crate::domain::ports::{DatastoreRef, EngineClientCollectionRef, OrchestratorRef};
use crate::error::{Error, Result};
use crate::manager::managed::ManagedVolume;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Cache of resident [`ManagedVolume`] handles
pub struct ManagedVolumeRegistry {
    ds: DatastoreRef,
    orch: OrchestratorRef,
    engines: EngineClientCollectionRef,
    volumes: Mutex<HashMap<String, Arc<ManagedVolume>>>,
}

impl ManagedVolumeRegistry {
    pub fn new(
        ds: DatastoreRef,
        orch: OrchestratorRef,
        engines: EngineClientCollectionRef,
    ) -> Self {
        Self {
            ds,
            orch,
            engines,
            volumes: Mutex::new(HashMap::new()),
        }
    }

    /// The resident handle for a volume, if any. Stopped handles (deleted
    /// volumes, shut-down workers) are evicted on access.
    pub async fn get_resident(&self, name: &str) -> Option<Arc<ManagedVolume>> {
        let mut volumes = self.volumes.lock().await;
        match volumes.get(name) {
            Some(managed) if !managed.is_stopped() => Some(Arc::clone(managed)),
            Some(_) => {
                volumes.remove(name);
                None
            }
            None => None,
        }
    }

    /// The resident handle for a volume, materializing one from the durable
    /// record when absent.
    ///
    /// Exactly one handle exists per name: the record is loaded outside the
    /// map lock, then membership is re-checked under the lock before
    /// insertion, so the loser of a construction race adopts the winner's
    /// handle.
    pub async fn get_or_create(&self, name: &str) -> Result<Arc<ManagedVolume>> {
        if let Some(managed) = self.get_resident(name).await {
            return Ok(managed);
        }

        let volume = self
            .ds
            .get_volume(name)
            .await?
            .ok_or_else(|| Error::VolumeNotFound {
                name: name.to_string(),
            })?;

        let mut volumes = self.volumes.lock().await;
        if let Some(existing) = volumes.get(name) {
            if !existing.is_stopped() {
                return Ok(Arc::clone(existing));
            }
            volumes.remove(name);
        }

        let managed = ManagedVolume::new(
            volume,
            Arc::clone(&self.ds),
            Arc::clone(&self.orch),
            Arc::clone(&self.engines),
        );
        managed.spawn_worker();
        volumes.insert(name.to_string(), Arc::clone(&managed));
        debug!(volume = %name, "materialized managed volume");
        Ok(managed)
    }

    /// Evict a handle, stopping its worker.
    pub async fn remove(&self, name: &str) {
        let managed = self.volumes.lock().await.remove(name);
        if let Some(managed) = managed {
            managed.shutdown().await;
            debug!(volume = %name, "evicted managed volume");
        }
    }

    /// Names of currently resident volumes
    pub async fn resident_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.volumes.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop every resident worker and wait for acknowledgment
    pub async fn shutdown_all(&self) {
        let drained: Vec<Arc<ManagedVolume>> =
            self.volumes.lock().await.drain().map(|(_, v)| v).collect();
        futures::future::join_all(drained.iter().map(|managed| managed.shutdown())).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDatastore;
    use crate::domain::ports::Datastore;
    use crate::domain::volume::{VolumeInfo, VolumeState};
    use crate::engine::SimEngineCollection;
    use crate::orchestrator::SimOrchestrator;
    use assert_matches::assert_matches;

    async fn registry_with_volume(name: Option<&str>) -> Arc<ManagedVolumeRegistry> {
        let ds = Arc::new(MemoryDatastore::new());
        if let Some(name) = name {
            ds.create_volume(&VolumeInfo {
                name: name.into(),
                owner_id: "node-1".into(),
                size: 1 << 30,
                from_backup: None,
                number_of_replicas: 2,
                stale_replica_timeout: 60,
                desire_state: VolumeState::Detached,
                recurring_jobs: Vec::new(),
                node_id: None,
                state: VolumeState::Detached,
                created: crate::util::now(),
            })
            .await
            .unwrap();
        }
        Arc::new(ManagedVolumeRegistry::new(
            ds,
            Arc::new(SimOrchestrator::new()),
            Arc::new(SimEngineCollection::new()),
        ))
    }

    #[tokio::test]
    async fn test_get_or_create_materializes_once() {
        let registry = registry_with_volume(Some("vol-1")).await;

        let first = registry.get_or_create("vol-1").await.unwrap();
        let second = registry.get_or_create("vol-1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.resident_names().await, vec!["vol-1"]);
    }

    #[tokio::test]
    async fn test_get_or_create_absent_record() {
        let registry = registry_with_volume(None).await;
        assert_matches!(
            registry.get_or_create("ghost").await,
            Err(Error::VolumeNotFound { .. })
        );
        assert!(registry.resident_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_yields_single_instance() {
        let registry = registry_with_volume(Some("vol-1")).await;

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.get_or_create("vol-1").await.unwrap()
            }));
        }

        let mut instances = Vec::new();
        for handle in handles {
            instances.push(handle.await.unwrap());
        }
        for instance in &instances[1..] {
            assert!(Arc::ptr_eq(&instances[0], instance));
        }
    }

    #[tokio::test]
    async fn test_remove_stops_worker() {
        let registry = registry_with_volume(Some("vol-1")).await;
        let managed = registry.get_or_create("vol-1").await.unwrap();

        registry.remove("vol-1").await;
        assert!(managed.is_stopped());
        assert!(registry.get_resident("vol-1").await.is_none());
    }

    #[tokio::test]
    async fn test_stopped_handle_is_replaced_on_next_access() {
        let registry = registry_with_volume(Some("vol-1")).await;
        let first = registry.get_or_create("vol-1").await.unwrap();
        first.shutdown().await;

        let second = registry.get_or_create("vol-1").await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!second.is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_all_drains() {
        let registry = registry_with_volume(Some("vol-1")).await;
        let managed = registry.get_or_create("vol-1").await.unwrap();

        registry.shutdown_all().await;
        assert!(managed.is_stopped());
        assert!(registry.resident_names().await.is_empty());
    }
}
