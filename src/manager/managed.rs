//! Managed Volume
//!
//! One live in-process handle per volume this manager instance is
//! responsible for. Owns a cancellable worker that reconciles desired vs.
//! observed state through the orchestrator, and exposes engine-client
//! access, snapshot/backup/replica operations, and a job-status view.
//!
//! Mutating operations on one volume are serialized behind a single async
//! mutex (single-writer-per-volume); the worker communicates with the
//! facade only through the datastore and the event channel.

use crate::domain::ports::{
    DatastoreRef, EngineClientCollectionRef, EngineClientRef, OrchestratorRef,
};
use crate::domain::volume::{VolumeInfo, VolumeState};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the worker re-checks desired vs. observed state without a nudge
const RECONCILE_INTERVAL: Duration = Duration::from_secs(5);

// =============================================================================
// Jobs
// =============================================================================

/// Kind of background job a managed volume runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    SnapshotBackup,
    SnapshotPurge,
}

/// Lifecycle of a background job
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Ongoing,
    Finished,
    Error,
}

/// Status view of one background job
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub job_type: JobType,
    pub state: JobState,
    pub created: String,
    #[serde(default)]
    pub completed: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

// =============================================================================
// Managed Volume
// =============================================================================

/// Live handle and reconciliation worker for one volume
#[derive(Debug)]
pub struct ManagedVolume {
    name: String,
    ds: DatastoreRef,
    orch: OrchestratorRef,
    engines: EngineClientCollectionRef,

    /// Last record this handle acted on; the mutex serializes all mutating
    /// operations against this volume
    state: tokio::sync::Mutex<VolumeInfo>,
    /// Background jobs keyed by job ID; shared with spawned job tasks
    jobs: Arc<Mutex<HashMap<String, JobInfo>>>,
    job_counter: AtomicU64,

    cancel: CancellationToken,
    nudge: Notify,
    worker: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ManagedVolume {
    /// Wrap a loaded volume record. Does no IO; the caller registers the
    /// handle and spawns the worker.
    pub(crate) fn new(
        volume: VolumeInfo,
        ds: DatastoreRef,
        orch: OrchestratorRef,
        engines: EngineClientCollectionRef,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: volume.name.clone(),
            ds,
            orch,
            engines,
            state: tokio::sync::Mutex::new(volume),
            jobs: Arc::new(Mutex::new(HashMap::new())),
            job_counter: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            nudge: Notify::new(),
            worker: Mutex::new(None),
            stopped: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the worker has ended (volume deleted or handle shut down).
    /// A stopped handle is evicted from the cache on next access.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Wake the worker for an immediate reconciliation pass
    pub fn notify(&self) {
        self.nudge.notify_one();
    }

    /// Signal the worker to stop and wait for it to acknowledge
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(volume = %self.name, error = %e, "worker ended abnormally");
            }
        }
        self.stopped.store(true, Ordering::Release);
    }

    // =========================================================================
    // Public operations
    // =========================================================================

    /// Handle to the volume's running engine
    pub async fn engine_client(&self) -> Result<EngineClientRef> {
        let controller = self
            .ds
            .get_volume_controller(&self.name)
            .await?
            .filter(|controller| controller.running)
            .ok_or_else(|| Error::EngineNotRunning {
                name: self.name.clone(),
            })?;
        self.engines.client_for(&self.name, &controller)
    }

    /// Trigger removal of obsolete snapshot data; safe to call repeatedly
    pub async fn snapshot_purge(&self) -> Result<()> {
        let client = self.engine_client().await?;
        let job_id = self.job_start(JobType::SnapshotPurge);
        match client.snapshot_purge().await {
            Ok(()) => {
                self.job_finish(&job_id, None);
                Ok(())
            }
            Err(e) => {
                self.job_finish(&job_id, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Back up an existing snapshot to the given target.
    ///
    /// Validates the snapshot up front, then runs the transfer as a tracked
    /// background job; poll `list_jobs_info` for completion.
    pub async fn snapshot_backup(&self, snapshot_name: &str, backup_target: &str) -> Result<()> {
        let _state = self.state.lock().await;
        let client = self.engine_client().await?;
        if !client.snapshot_exists(snapshot_name).await? {
            return Err(Error::SnapshotNotFound {
                volume: self.name.clone(),
                snapshot: snapshot_name.to_string(),
            });
        }

        let job_id = self.job_start(JobType::SnapshotBackup);
        let jobs = Arc::clone(&self.jobs);
        let volume_name = self.name.clone();
        let snapshot = snapshot_name.to_string();
        let target = backup_target.to_string();
        tokio::spawn(async move {
            let outcome = client.snapshot_backup(&snapshot, &target).await;
            match outcome {
                Ok(()) => {
                    info!(volume = %volume_name, snapshot = %snapshot, "snapshot backup finished");
                    finish_job(&jobs, &job_id, None);
                }
                Err(e) => {
                    warn!(volume = %volume_name, snapshot = %snapshot, error = %e, "snapshot backup failed");
                    finish_job(&jobs, &job_id, Some(e.to_string()));
                }
            }
        });
        Ok(())
    }

    /// Remove one replica from the live topology.
    ///
    /// Refuses to remove the last healthy replica; that would leave the
    /// volume with no usable data path.
    pub async fn replica_remove(&self, replica_name: &str) -> Result<()> {
        let _state = self.state.lock().await;

        let replica = self
            .ds
            .get_volume_replica(&self.name, replica_name)
            .await?
            .ok_or_else(|| Error::ReplicaNotFound {
                volume: self.name.clone(),
                replica: replica_name.to_string(),
            })?;

        let replicas = self.ds.list_volume_replicas(&self.name).await?;
        let healthy = replicas.values().filter(|r| r.is_healthy()).count();
        if replica.is_healthy() && healthy <= 1 {
            return Err(Error::LastHealthyReplica {
                volume: self.name.clone(),
                replica: replica_name.to_string(),
            });
        }

        // Detach from the engine topology first when an engine is running;
        // a detached volume has no live topology to update.
        if let Ok(client) = self.engine_client().await {
            client.replica_remove(&replica.address).await?;
        }

        self.orch.delete_replica(&self.name, replica_name).await?;
        self.ds.delete_volume_replica(&self.name, replica_name).await?;
        info!(volume = %self.name, replica = %replica_name, "removed replica");
        Ok(())
    }

    /// Current view of background jobs, keyed by job ID. Never blocks on a
    /// running job.
    pub fn list_jobs_info(&self) -> HashMap<String, JobInfo> {
        self.jobs.lock().clone()
    }

    // =========================================================================
    // Job tracking
    // =========================================================================

    fn job_start(&self, job_type: JobType) -> String {
        let id = format!(
            "{}-job-{}",
            self.name,
            self.job_counter.fetch_add(1, Ordering::Relaxed)
        );
        self.jobs.lock().insert(
            id.clone(),
            JobInfo {
                id: id.clone(),
                job_type,
                state: JobState::Ongoing,
                created: crate::util::now(),
                completed: None,
                error: None,
            },
        );
        id
    }

    fn job_finish(&self, job_id: &str, error: Option<String>) {
        finish_job(&self.jobs, job_id, error);
    }

    // =========================================================================
    // Reconciliation worker
    // =========================================================================

    /// Spawn the reconciliation loop. Called once, by the cache, right after
    /// registration.
    pub(crate) fn spawn_worker(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run_worker().await;
        });
        *self.worker.lock() = Some(handle);
    }

    async fn run_worker(self: Arc<Self>) {
        debug!(volume = %self.name, "reconciliation worker started");
        let mut interval = tokio::time::interval(RECONCILE_INTERVAL);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.nudge.notified() => {}
                _ = interval.tick() => {}
            }

            match self.reconcile_once().await {
                Ok(true) => break,
                Ok(false) => {}
                Err(e) => {
                    warn!(volume = %self.name, error = %e, "reconciliation step failed");
                    if !e.is_retryable() {
                        // Wait for the record to change before trying again
                        tokio::select! {
                            _ = self.cancel.cancelled() => break,
                            _ = self.nudge.notified() => {}
                        }
                    }
                }
            }
        }
        self.stopped.store(true, Ordering::Release);
        debug!(volume = %self.name, "reconciliation worker stopped");
    }

    /// One idempotent reconciliation step.
    ///
    /// Reads the durable record, drives the orchestrator toward
    /// `desire_state`, and writes back only what was actually observed —
    /// state never regresses past reality. Returns `Ok(true)` when the
    /// worker has nothing left to do (volume gone or deleted).
    pub(crate) async fn reconcile_once(&self) -> Result<bool> {
        let mut state = self.state.lock().await;

        let Some(mut volume) = self.ds.get_volume(&self.name).await? else {
            return Ok(true);
        };

        if volume.desire_state == VolumeState::Deleted {
            self.teardown().await?;
            if volume.state != VolumeState::Deleted {
                volume.state = VolumeState::Deleted;
                self.ds.update_volume(&volume).await?;
                info!(volume = %self.name, "volume deleted");
            }
            *state = volume;
            return Ok(true);
        }

        let observed = match (volume.state, volume.desire_state) {
            (VolumeState::Created, VolumeState::Detached) => {
                Some(self.provision_replicas(&volume).await?)
            }
            (VolumeState::Detached, VolumeState::Healthy) => Some(self.start(&volume).await?),
            (VolumeState::Healthy | VolumeState::Degraded, VolumeState::Detached) => {
                Some(self.stop(&volume).await?)
            }
            // Post-salvage: replicas are healthy again, return to detachable
            (VolumeState::Fault, VolumeState::Detached) => Some(self.stop(&volume).await?),
            (VolumeState::Healthy | VolumeState::Degraded, VolumeState::Healthy) => {
                Some(self.observe_health(&volume).await?)
            }
            // Fault requires salvage; everything else is already converged
            _ => None,
        };

        if let Some(observed) = observed {
            if observed != volume.state {
                debug!(
                    volume = %self.name,
                    from = %volume.state,
                    to = %observed,
                    "observed state change"
                );
                volume.state = observed;
                self.ds.update_volume(&volume).await?;
            }
        }
        *state = volume;
        Ok(false)
    }

    /// Created -> Detached: bring the configured replica set into existence
    async fn provision_replicas(&self, volume: &VolumeInfo) -> Result<VolumeState> {
        for index in 1..=volume.number_of_replicas {
            let replica_name = format!("{}-r-{}", volume.name, index);
            let replica = self.orch.create_replica(volume, &replica_name).await?;
            self.ds.update_volume_replica(&replica).await?;
        }
        info!(
            volume = %volume.name,
            replicas = volume.number_of_replicas,
            "provisioned replica set"
        );
        Ok(VolumeState::Detached)
    }

    /// Detached -> Healthy: start healthy replicas, then the engine
    async fn start(&self, volume: &VolumeInfo) -> Result<VolumeState> {
        let node_id = volume.node_id.as_deref().ok_or_else(|| {
            Error::VolumeValidation {
                name: volume.name.clone(),
                reason: "cannot attach without a target node".into(),
            }
        })?;

        let replicas = self.ds.list_volume_replicas(&volume.name).await?;
        let mut addresses = Vec::new();
        for replica in replicas.values().filter(|r| r.is_healthy()) {
            let started = self.orch.start_replica(&volume.name, &replica.name).await?;
            self.ds.update_volume_replica(&started).await?;
            addresses.push(started.address);
        }

        if addresses.is_empty() {
            warn!(volume = %volume.name, "no healthy replicas to start, volume is faulted");
            return Ok(VolumeState::Fault);
        }

        let controller = self.orch.start_engine(volume, node_id, &addresses).await?;
        self.ds.update_volume_controller(&controller).await?;
        info!(volume = %volume.name, node = %node_id, "volume attached");

        if addresses.len() < volume.number_of_replicas as usize {
            Ok(VolumeState::Degraded)
        } else {
            Ok(VolumeState::Healthy)
        }
    }

    /// Healthy/Degraded -> Detached: stop the engine, then the replicas
    async fn stop(&self, volume: &VolumeInfo) -> Result<VolumeState> {
        self.orch.stop_engine(&volume.name).await?;
        self.ds.delete_volume_controller(&volume.name).await?;

        let replicas = self.ds.list_volume_replicas(&volume.name).await?;
        for replica in replicas.values() {
            self.orch.stop_replica(&volume.name, &replica.name).await?;
            let mut stopped = replica.clone();
            stopped.running = false;
            self.ds.update_volume_replica(&stopped).await?;
        }
        info!(volume = %volume.name, "volume detached");
        Ok(VolumeState::Detached)
    }

    /// Re-observe replica health for an attached volume
    async fn observe_health(&self, volume: &VolumeInfo) -> Result<VolumeState> {
        let replicas = self.ds.list_volume_replicas(&volume.name).await?;
        let healthy = replicas.values().filter(|r| r.is_healthy()).count();

        Ok(if healthy == 0 {
            warn!(volume = %volume.name, "no healthy replicas remain, volume is faulted");
            VolumeState::Fault
        } else if healthy < volume.number_of_replicas as usize {
            VolumeState::Degraded
        } else {
            VolumeState::Healthy
        })
    }

    /// Desire Deleted: remove engine and replica processes and their records
    async fn teardown(&self) -> Result<()> {
        self.orch.delete_engine(&self.name).await?;
        self.ds.delete_volume_controller(&self.name).await?;

        let replicas = self.ds.list_volume_replicas(&self.name).await?;
        for replica_name in replicas.keys() {
            self.orch.delete_replica(&self.name, replica_name).await?;
            self.ds.delete_volume_replica(&self.name, replica_name).await?;
        }
        Ok(())
    }
}

/// Settle a job entry; shared between the handle and spawned job tasks
fn finish_job(jobs: &Mutex<HashMap<String, JobInfo>>, job_id: &str, error: Option<String>) {
    if let Some(job) = jobs.lock().get_mut(job_id) {
        job.state = if error.is_some() {
            JobState::Error
        } else {
            JobState::Finished
        };
        job.completed = Some(crate::util::now());
        job.error = error;
    }
}
