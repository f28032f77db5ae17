//! Volume Manager Facade
//!
//! The externally callable API of the control plane: validates requests,
//! applies state transitions to the durable volume record, and dispatches
//! per-volume operations through the managed-volume cache. The actual
//! convergence of observed state toward desired state is the job of each
//! managed volume's reconciliation worker.

pub mod events;
pub mod managed;
pub mod registry;

pub use events::{event_channel, EventSender, VolumeEvent, EVENT_CHANNEL_CAPACITY};
pub use managed::{JobInfo, JobState, JobType, ManagedVolume};
pub use registry::ManagedVolumeRegistry;

use crate::domain::ports::{
    DatastoreRef, EngineClientCollectionRef, EngineClientRef, OrchestratorRef,
};
use crate::domain::volume::{
    ControllerInfo, RecurringJob, ReplicaInfo, SettingsInfo, VolumeInfo, VolumeState,
};
use crate::error::{Error, Result};
use crate::node::NodeRegistry;
use crate::util;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

// =============================================================================
// Requests
// =============================================================================

/// Parameters for creating a volume through the API
#[derive(Debug, Clone)]
pub struct VolumeCreateRequest {
    pub name: String,
    /// Human-readable size string ("10Gi"); superseded by the backup's
    /// recorded size when `from_backup` is set
    pub size: String,
    pub from_backup: Option<String>,
    pub number_of_replicas: u32,
    pub stale_replica_timeout: u32,
}

// =============================================================================
// Volume Manager
// =============================================================================

/// Facade coordinating volume lifecycle across the datastore, orchestrator,
/// engine API, and the managed-volume cache
pub struct VolumeManager {
    ds: DatastoreRef,
    nodes: Arc<NodeRegistry>,
    engines: EngineClientCollectionRef,
    managed: ManagedVolumeRegistry,
    events: EventSender,
    engine_image: String,
}

impl VolumeManager {
    /// Build the manager and register the local node (first-run sentinel).
    ///
    /// Returns the receiving half of the event channel for the external
    /// reconciliation dispatcher.
    pub fn new(
        ds: DatastoreRef,
        orch: OrchestratorRef,
        engines: EngineClientCollectionRef,
        nodes: Arc<NodeRegistry>,
        engine_image: impl Into<String>,
    ) -> Result<(Self, mpsc::Receiver<VolumeEvent>)> {
        nodes.register_node(-1)?;
        let (events, event_rx) = event_channel();
        let managed =
            ManagedVolumeRegistry::new(Arc::clone(&ds), orch, Arc::clone(&engines));
        Ok((
            Self {
                ds,
                nodes,
                engines,
                managed,
                events,
                engine_image: engine_image.into(),
            },
            event_rx,
        ))
    }

    /// Engine image used to launch engine/replica processes
    pub fn get_engine_image(&self) -> &str {
        &self.engine_image
    }

    /// The managed-volume cache, for direct handle access
    pub fn managed_volumes(&self) -> &ManagedVolumeRegistry {
        &self.managed
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Create a new volume record, placed on a randomly selected node
    pub async fn volume_create(&self, request: VolumeCreateRequest) -> Result<VolumeInfo> {
        self.do_volume_create(request)
            .await
            .map_err(|e| Error::operation("create volume", e))
    }

    async fn do_volume_create(&self, request: VolumeCreateRequest) -> Result<VolumeInfo> {
        let mut size = util::parse_size(&request.size)?;

        // Make it a random node's responsibility
        let node = self.nodes.get_random_node()?;

        // A restored volume is always the size the backup recorded,
        // regardless of what was requested
        if let Some(locator) = &request.from_backup {
            let backup = self.engines.get_backup(locator).await?;
            size = backup.volume_size;
        }

        let volume = VolumeInfo {
            name: request.name,
            owner_id: node.id,
            size,
            from_backup: request.from_backup,
            number_of_replicas: request.number_of_replicas,
            stale_replica_timeout: request.stale_replica_timeout,
            desire_state: VolumeState::Detached,
            recurring_jobs: Vec::new(),
            node_id: None,
            state: VolumeState::Created,
            created: util::now(),
        };
        volume.validate()?;
        self.ds.create_volume(&volume).await?;
        debug!(volume = %volume.name, size, "created volume");
        Ok(volume)
    }

    /// Attach a detached volume to a node
    pub async fn volume_attach(&self, name: &str, node_id: &str) -> Result<()> {
        self.do_volume_attach(name, node_id)
            .await
            .map_err(|e| Error::operation("attach volume", e))
    }

    async fn do_volume_attach(&self, name: &str, node_id: &str) -> Result<()> {
        let mut volume = self.get_existing_volume(name).await?;
        if volume.state != VolumeState::Detached {
            return Err(Error::InvalidVolumeState {
                operation: "attach",
                state: volume.state.to_string(),
            });
        }

        volume.node_id = Some(node_id.to_string());
        volume.owner_id = node_id.to_string();
        volume.desire_state = VolumeState::Healthy;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, node = %node_id, "attaching volume");
        Ok(())
    }

    /// Detach an attached volume from its node
    pub async fn volume_detach(&self, name: &str) -> Result<()> {
        self.do_volume_detach(name)
            .await
            .map_err(|e| Error::operation("detach volume", e))
    }

    async fn do_volume_detach(&self, name: &str) -> Result<()> {
        let mut volume = self.get_existing_volume(name).await?;
        if !matches!(volume.state, VolumeState::Healthy | VolumeState::Degraded) {
            return Err(Error::InvalidVolumeState {
                operation: "detach",
                state: volume.state.to_string(),
            });
        }

        volume.desire_state = VolumeState::Detached;
        volume.node_id = None;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, "detaching volume");
        Ok(())
    }

    /// Mark a volume for deletion; teardown is the reconciler's job
    pub async fn volume_delete(&self, name: &str) -> Result<()> {
        self.do_volume_delete(name)
            .await
            .map_err(|e| Error::operation("delete volume", e))
    }

    async fn do_volume_delete(&self, name: &str) -> Result<()> {
        let mut volume = self.get_existing_volume(name).await?;
        volume.desire_state = VolumeState::Deleted;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, "deleting volume");
        Ok(())
    }

    /// Recover a faulted volume by clearing fault markers on the named
    /// replicas.
    ///
    /// Every named replica must currently be failed. A replica update
    /// failure aborts the operation with the failing replica named;
    /// already-cleared replicas stay cleared and the volume's desired state
    /// is only updated after all replica updates succeed, so a partial
    /// failure is safe to retry.
    pub async fn volume_salvage(&self, name: &str, replica_names: &[String]) -> Result<()> {
        self.do_volume_salvage(name, replica_names)
            .await
            .map_err(|e| Error::operation("salvage volume", e))
    }

    async fn do_volume_salvage(&self, name: &str, replica_names: &[String]) -> Result<()> {
        let mut volume = self.get_existing_volume(name).await?;
        if volume.state != VolumeState::Fault {
            return Err(Error::InvalidVolumeState {
                operation: "salvage",
                state: volume.state.to_string(),
            });
        }

        for replica_name in replica_names {
            let mut replica = self
                .ds
                .get_volume_replica(name, replica_name)
                .await?
                .ok_or_else(|| Error::ReplicaNotFound {
                    volume: name.to_string(),
                    replica: replica_name.clone(),
                })?;
            if replica.is_healthy() {
                return Err(Error::ReplicaNotFailed {
                    name: replica_name.clone(),
                });
            }
            replica.failed_at = None;
            self.ds.update_volume_replica(&replica).await?;
        }

        volume.desire_state = VolumeState::Detached;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, replicas = replica_names.len(), "salvaging volume");
        Ok(())
    }

    /// Replace a volume's recurring snapshot/backup schedule
    pub async fn volume_recurring_update(
        &self,
        name: &str,
        jobs: Vec<RecurringJob>,
    ) -> Result<()> {
        self.do_volume_recurring_update(name, jobs)
            .await
            .map_err(|e| Error::operation("update volume recurring jobs", e))
    }

    async fn do_volume_recurring_update(
        &self,
        name: &str,
        jobs: Vec<RecurringJob>,
    ) -> Result<()> {
        let mut volume = self.get_existing_volume(name).await?;
        volume.recurring_jobs = jobs;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, "updated recurring schedule");
        Ok(())
    }

    /// Adopt a volume record created out-of-band and announce it.
    ///
    /// No-ops when the record is already in its created state. Emits exactly
    /// one notification event on success and none on any failure path.
    pub async fn volume_create_by_spec(&self, name: &str) -> Result<()> {
        let adopted = self
            .do_volume_create_by_spec(name)
            .await
            .map_err(|e| Error::operation("create volume by spec", e))?;
        if adopted {
            self.events.notify_volume(name);
        }
        Ok(())
    }

    async fn do_volume_create_by_spec(&self, name: &str) -> Result<bool> {
        let mut volume = self.get_existing_volume(name).await?;

        // Already adopted through the create API
        if volume.state == VolumeState::Created {
            return Ok(false);
        }

        if volume.owner_id.is_empty() {
            return Err(Error::MissingOwner {
                name: name.to_string(),
            });
        }

        volume.created = util::now();
        volume.state = VolumeState::Created;
        volume.desire_state = VolumeState::Detached;
        volume.validate()?;
        self.ds.update_volume(&volume).await?;
        debug!(volume = %name, "created volume by spec");
        Ok(true)
    }

    // =========================================================================
    // Read-only accessors
    // =========================================================================

    pub async fn volume_list(&self) -> Result<BTreeMap<String, VolumeInfo>> {
        self.ds.list_volumes().await
    }

    pub async fn volume_info(&self, name: &str) -> Result<Option<VolumeInfo>> {
        self.ds.get_volume(name).await
    }

    pub async fn volume_controller_info(&self, name: &str) -> Result<Option<ControllerInfo>> {
        self.ds.get_volume_controller(name).await
    }

    pub async fn volume_replica_list(&self, name: &str) -> Result<BTreeMap<String, ReplicaInfo>> {
        self.ds.list_volume_replicas(name).await
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// Read the settings record, creating an empty default on first access.
    ///
    /// A creation failure is logged but not fatal; the subsequent re-read's
    /// outcome is authoritative.
    pub async fn settings_get(&self) -> Result<SettingsInfo> {
        if let Some(settings) = self.ds.get_settings().await? {
            return Ok(settings);
        }
        if let Err(e) = self.ds.create_settings(&SettingsInfo::default()).await {
            warn!(error = %e, "failed to create default settings");
        }
        self.ds
            .get_settings()
            .await?
            .ok_or_else(|| Error::Internal("settings record missing after create".into()))
    }

    pub async fn settings_set(&self, settings: &SettingsInfo) -> Result<()> {
        self.ds.update_settings(settings).await
    }

    // =========================================================================
    // Dispatch operations
    // =========================================================================

    /// Handle to a volume's running engine
    pub async fn engine_client(&self, volume_name: &str) -> Result<EngineClientRef> {
        let managed = self.managed.get_or_create(volume_name).await?;
        managed.engine_client().await
    }

    /// Trigger removal of obsolete snapshot data on a volume's engine
    pub async fn snapshot_purge(&self, volume_name: &str) -> Result<()> {
        let managed = self.managed.get_or_create(volume_name).await?;
        managed.snapshot_purge().await
    }

    /// Back up an existing snapshot of a volume to the given target
    pub async fn snapshot_backup(
        &self,
        volume_name: &str,
        snapshot_name: &str,
        backup_target: &str,
    ) -> Result<()> {
        let managed = self.managed.get_or_create(volume_name).await?;
        managed.snapshot_backup(snapshot_name, backup_target).await
    }

    /// Remove one replica from a volume's live topology
    pub async fn replica_remove(&self, volume_name: &str, replica_name: &str) -> Result<()> {
        let managed = self.managed.get_or_create(volume_name).await?;
        managed.replica_remove(replica_name).await
    }

    /// Current background jobs of a volume, keyed by job ID
    pub async fn job_list(&self, volume_name: &str) -> Result<HashMap<String, JobInfo>> {
        let managed = self.managed.get_or_create(volume_name).await?;
        Ok(managed.list_jobs_info())
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Signal all resident workers to stop and wait for acknowledgment
    pub async fn shutdown(&self) {
        info!("shutting down volume manager");
        self.managed.shutdown_all().await;
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn get_existing_volume(&self, name: &str) -> Result<VolumeInfo> {
        self.ds
            .get_volume(name)
            .await?
            .ok_or_else(|| Error::VolumeNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::MemoryDatastore;
    use crate::domain::ports::{BackupInfo, Datastore};
    use crate::engine::SimEngineCollection;
    use crate::orchestrator::SimOrchestrator;
    use assert_matches::assert_matches;

    struct Fixture {
        ds: Arc<MemoryDatastore>,
        engines: Arc<SimEngineCollection>,
        manager: VolumeManager,
        events: mpsc::Receiver<VolumeEvent>,
    }

    fn fixture() -> Fixture {
        let ds = Arc::new(MemoryDatastore::new());
        let engines = Arc::new(SimEngineCollection::new());
        let nodes = NodeRegistry::new("node-1", "node-1.cluster.local:9500");
        let (manager, events) = VolumeManager::new(
            ds.clone(),
            Arc::new(SimOrchestrator::new()),
            engines.clone(),
            nodes,
            "engine:v1.0",
        )
        .unwrap();
        Fixture {
            ds,
            engines,
            manager,
            events,
        }
    }

    fn create_request(name: &str) -> VolumeCreateRequest {
        VolumeCreateRequest {
            name: name.into(),
            size: "10Gi".into(),
            from_backup: None,
            number_of_replicas: 3,
            stale_replica_timeout: 60,
        }
    }

    async fn force_state(fx: &Fixture, name: &str, state: VolumeState) {
        let mut volume = fx.ds.get_volume(name).await.unwrap().unwrap();
        volume.state = state;
        fx.ds.update_volume(&volume).await.unwrap();
    }

    #[tokio::test]
    async fn test_volume_create() {
        let fx = fixture();
        let volume = fx.manager.volume_create(create_request("vol-1")).await.unwrap();

        assert_eq!(volume.owner_id, "node-1");
        assert_eq!(volume.size, 10 * 1024 * 1024 * 1024);
        assert_eq!(volume.state, VolumeState::Created);
        assert_eq!(volume.desire_state, VolumeState::Detached);
        assert!(fx.ds.get_volume("vol-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_volume_create_rejects_bad_size() {
        let fx = fixture();
        let mut request = create_request("vol-1");
        request.size = "ten gigs".into();

        let err = fx.manager.volume_create(request).await.unwrap_err();
        assert_matches!(err.root(), Error::CapacityParse(_));
        assert!(fx.ds.get_volume("vol-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_volume_create_from_backup_overrides_size() {
        let fx = fixture();
        fx.engines.add_backup(
            "s3://backups?volume=old&backup=snap-1",
            BackupInfo {
                volume_name: "old".into(),
                volume_size: 40 * 1024 * 1024 * 1024,
                snapshot_name: "snap-1".into(),
                created: util::now(),
            },
        );

        let mut request = create_request("restored");
        request.from_backup = Some("s3://backups?volume=old&backup=snap-1".into());
        // Requested size loses to the backup's recorded size
        request.size = "10Gi".into();

        let volume = fx.manager.volume_create(request).await.unwrap();
        assert_eq!(volume.size, 40 * 1024 * 1024 * 1024);
    }

    #[tokio::test]
    async fn test_volume_create_unknown_backup() {
        let fx = fixture();
        let mut request = create_request("restored");
        request.from_backup = Some("s3://backups?volume=missing".into());

        let err = fx.manager.volume_create(request).await.unwrap_err();
        assert_matches!(err.root(), Error::BackupLookup { .. });
    }

    #[tokio::test]
    async fn test_attach_requires_detached() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();

        // Still Created, not yet reconciled to Detached
        let err = fx.manager.volume_attach("vol-1", "node-1").await.unwrap_err();
        assert_matches!(err.root(), Error::InvalidVolumeState { .. });

        // Record unchanged by the failed attach
        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Detached);
        assert!(volume.node_id.is_none());

        force_state(&fx, "vol-1", VolumeState::Detached).await;
        fx.manager.volume_attach("vol-1", "node-2").await.unwrap();

        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.node_id.as_deref(), Some("node-2"));
        assert_eq!(volume.owner_id, "node-2");
        assert_eq!(volume.desire_state, VolumeState::Healthy);
    }

    #[tokio::test]
    async fn test_attach_missing_volume() {
        let fx = fixture();
        let err = fx.manager.volume_attach("ghost", "node-1").await.unwrap_err();
        assert_matches!(err.root(), Error::VolumeNotFound { .. });
    }

    #[tokio::test]
    async fn test_detach_requires_attached() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();

        let err = fx.manager.volume_detach("vol-1").await.unwrap_err();
        assert_matches!(err.root(), Error::InvalidVolumeState { .. });

        for state in [VolumeState::Healthy, VolumeState::Degraded] {
            force_state(&fx, "vol-1", state).await;
            fx.manager.volume_detach("vol-1").await.unwrap();

            let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
            assert_eq!(volume.desire_state, VolumeState::Detached);
            assert!(volume.node_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_delete_any_state() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        fx.manager.volume_delete("vol-1").await.unwrap();

        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Deleted);
    }

    async fn seed_replica(fx: &Fixture, name: &str, failed: bool) {
        fx.ds
            .update_volume_replica(&ReplicaInfo {
                name: name.into(),
                volume_name: "vol-1".into(),
                node_id: "node-1".into(),
                address: format!("tcp://node-1:9502/{name}"),
                failed_at: failed.then(util::now),
                running: false,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_salvage_clears_failed_replicas() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        force_state(&fx, "vol-1", VolumeState::Fault).await;
        seed_replica(&fx, "vol-1-r-1", true).await;
        seed_replica(&fx, "vol-1-r-2", true).await;

        fx.manager
            .volume_salvage("vol-1", &["vol-1-r-1".into(), "vol-1-r-2".into()])
            .await
            .unwrap();

        for replica_name in ["vol-1-r-1", "vol-1-r-2"] {
            let replica = fx
                .ds
                .get_volume_replica("vol-1", replica_name)
                .await
                .unwrap()
                .unwrap();
            assert!(replica.is_healthy());
        }
        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Detached);
    }

    #[tokio::test]
    async fn test_salvage_rejects_healthy_replica() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        force_state(&fx, "vol-1", VolumeState::Fault).await;
        seed_replica(&fx, "vol-1-r-1", true).await;
        seed_replica(&fx, "vol-1-r-2", false).await;

        let err = fx
            .manager
            .volume_salvage("vol-1", &["vol-1-r-1".into(), "vol-1-r-2".into()])
            .await
            .unwrap_err();
        assert_matches!(err.root(), Error::ReplicaNotFailed { name } if name == "vol-1-r-2");

        // Desired state untouched by the aborted salvage
        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Detached);
        assert_eq!(volume.state, VolumeState::Fault);
    }

    #[tokio::test]
    async fn test_salvage_requires_fault() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        seed_replica(&fx, "vol-1-r-1", true).await;

        let err = fx
            .manager
            .volume_salvage("vol-1", &["vol-1-r-1".into()])
            .await
            .unwrap_err();
        assert_matches!(err.root(), Error::InvalidVolumeState { .. });
    }

    #[tokio::test]
    async fn test_recurring_update() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();

        let jobs = vec![RecurringJob {
            name: "nightly".into(),
            task: crate::domain::volume::RecurringTask::Snapshot,
            cron: "0 2 * * *".into(),
            retain: 7,
        }];
        fx.manager
            .volume_recurring_update("vol-1", jobs.clone())
            .await
            .unwrap();

        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.recurring_jobs, jobs);
    }

    #[tokio::test]
    async fn test_settings_get_creates_default_once() {
        let fx = fixture();

        let first = fx.manager.settings_get().await.unwrap();
        assert_eq!(first, SettingsInfo::default());

        let mut updated = first.clone();
        updated.backup_target = "s3://backups".into();
        fx.manager.settings_set(&updated).await.unwrap();

        // Second read must return the stored record, not recreate a default
        let second = fx.manager.settings_get().await.unwrap();
        assert_eq!(second.backup_target, "s3://backups");
    }

    #[tokio::test]
    async fn test_create_by_spec_emits_single_event() {
        let mut fx = fixture();

        // Out-of-band record: not Created, owner set
        let mut volume = fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        volume.state = VolumeState::Detached;
        fx.ds.update_volume(&volume).await.unwrap();

        fx.manager.volume_create_by_spec("vol-1").await.unwrap();

        let event = fx.events.try_recv().unwrap();
        assert_eq!(event.volume_name, "vol-1");
        assert!(fx.events.try_recv().is_err());

        let volume = fx.ds.get_volume("vol-1").await.unwrap().unwrap();
        assert_eq!(volume.state, VolumeState::Created);
        assert_eq!(volume.desire_state, VolumeState::Detached);
    }

    #[tokio::test]
    async fn test_create_by_spec_idempotent_noop() {
        let mut fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        let created = fx.ds.get_volume("vol-1").await.unwrap().unwrap().created;

        // Already Created: both calls are no-ops, no events, no timestamp reset
        fx.manager.volume_create_by_spec("vol-1").await.unwrap();
        fx.manager.volume_create_by_spec("vol-1").await.unwrap();

        assert!(fx.events.try_recv().is_err());
        assert_eq!(
            fx.ds.get_volume("vol-1").await.unwrap().unwrap().created,
            created
        );
    }

    #[tokio::test]
    async fn test_create_by_spec_requires_owner() {
        let mut fx = fixture();
        let mut volume = fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        volume.state = VolumeState::Detached;
        volume.owner_id = String::new();
        fx.ds.update_volume(&volume).await.unwrap();

        let err = fx.manager.volume_create_by_spec("vol-1").await.unwrap_err();
        assert_matches!(err.root(), Error::MissingOwner { .. });
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_by_spec_missing_volume_emits_nothing() {
        let mut fx = fixture();
        let err = fx.manager.volume_create_by_spec("ghost").await.unwrap_err();
        assert_matches!(err.root(), Error::VolumeNotFound { .. });
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dispatch_missing_volume() {
        let fx = fixture();
        let err = fx.manager.snapshot_purge("ghost").await.unwrap_err();
        assert_matches!(err, Error::VolumeNotFound { .. });
    }

    #[tokio::test]
    async fn test_job_list_empty_for_fresh_volume() {
        let fx = fixture();
        fx.manager.volume_create(create_request("vol-1")).await.unwrap();
        let jobs = fx.manager.job_list("vol-1").await.unwrap();
        assert!(jobs.is_empty());
        fx.manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_end_to_end_lifecycle() {
        let fx = fixture();

        let volume = fx.manager.volume_create(create_request("v1")).await.unwrap();
        assert_eq!(volume.state, VolumeState::Created);
        assert_eq!(volume.desire_state, VolumeState::Detached);
        assert_eq!(volume.number_of_replicas, 3);

        // Reconciled to detached, then attached
        force_state(&fx, "v1", VolumeState::Detached).await;
        fx.manager.volume_attach("v1", "n1").await.unwrap();
        let volume = fx.ds.get_volume("v1").await.unwrap().unwrap();
        assert_eq!(volume.node_id.as_deref(), Some("n1"));
        assert_eq!(volume.desire_state, VolumeState::Healthy);

        // Reconciled to healthy, then detached
        force_state(&fx, "v1", VolumeState::Healthy).await;
        fx.manager.volume_detach("v1").await.unwrap();
        let volume = fx.ds.get_volume("v1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Detached);
        assert!(volume.node_id.is_none());

        // Finally deleted
        fx.manager.volume_delete("v1").await.unwrap();
        let volume = fx.ds.get_volume("v1").await.unwrap().unwrap();
        assert_eq!(volume.desire_state, VolumeState::Deleted);
    }

    #[tokio::test]
    async fn test_engine_image_accessor() {
        let fx = fixture();
        assert_eq!(fx.manager.get_engine_image(), "engine:v1.0");
    }
}
