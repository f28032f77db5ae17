//! Volume Manager - Distributed Block Storage Control Plane
//!
//! Per-volume lifecycle management for a distributed block store: volumes
//! carry a durable record with an observed state and a desired state, and a
//! background worker per attached volume converges one toward the other.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Volume Manager Facade                      │
//! │   create / attach / detach / delete / salvage / snapshot ops     │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌───────────────┐  ┌──────────────────────┐  ┌──────────────┐  │
//! │  │ Node Registry │  │ Managed Volume Cache │  │ Event Channel│  │
//! │  │  (placement)  │  │  name → handle +     │  │  (bounded,   │  │
//! │  │               │  │  reconcile worker    │  │  non-block)  │  │
//! │  └───────────────┘  └──────────┬───────────┘  └──────────────┘  │
//! ├────────────────────────────────┼────────────────────────────────┤
//! │        ┌───────────────────────┼──────────────────────┐         │
//! │  ┌─────┴─────┐        ┌────────┴───────┐      ┌───────┴──────┐  │
//! │  │ Datastore │        │  Orchestrator  │      │  Engine API  │  │
//! │  │ (records) │        │  (processes)   │      │ (snapshots)  │  │
//! │  └───────────┘        └────────────────┘      └──────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`manager`]: the facade, managed-volume cache, and reconciliation worker
//! - [`domain`]: core domain types and the datastore/orchestrator/engine ports
//! - [`datastore`]: in-memory datastore backend
//! - [`orchestrator`]: simulated process orchestrator
//! - [`engine`]: simulated engine API collection
//! - [`node`]: cluster node registry and placement
//! - [`error`]: error types and retry classification

pub mod datastore;
pub mod domain;
pub mod engine;
pub mod error;
pub mod manager;
pub mod node;
pub mod orchestrator;
pub mod util;

// Re-export commonly used types
pub use domain::ports::{
    BackupInfo, Datastore, DatastoreRef, EngineClient, EngineClientCollection,
    EngineClientCollectionRef, EngineClientRef, Orchestrator, OrchestratorRef,
};
pub use domain::volume::{
    ControllerInfo, RecurringJob, RecurringTask, ReplicaInfo, SettingsInfo, VolumeInfo,
    VolumeState,
};

pub use error::{Error, ErrorAction, Result};

pub use manager::{
    JobInfo, JobState, JobType, VolumeCreateRequest, VolumeEvent, VolumeManager,
};

pub use node::{Node, NodeRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
