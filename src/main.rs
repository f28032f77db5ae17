//! Volume Manager - Distributed Block Storage Control Plane
//!
//! Standalone binary: wires the in-memory datastore, the simulated
//! orchestrator, and the simulated engine collection behind the volume
//! manager facade, then walks one volume through its full lifecycle.

use clap::Parser;
use std::time::{Duration, Instant};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use volume_manager::datastore::MemoryDatastore;
use volume_manager::engine::SimEngineCollection;
use volume_manager::orchestrator::SimOrchestrator;
use volume_manager::{
    Error, NodeRegistry, Result, VolumeCreateRequest, VolumeManager, VolumeState,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Volume Manager - per-volume lifecycle control plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// ID of this node
    #[arg(long, env = "NODE_ID", default_value = "node-1")]
    node_id: String,

    /// Management address of this node
    #[arg(long, env = "NODE_ADDRESS", default_value = "127.0.0.1:9500")]
    node_address: String,

    /// Engine image used to launch engine and replica processes
    #[arg(long, env = "ENGINE_IMAGE", default_value = "longhorn-engine:latest")]
    engine_image: String,

    /// Demo volume size
    #[arg(long, env = "VOLUME_SIZE", default_value = "1Gi")]
    volume_size: String,

    /// Demo volume replica count
    #[arg(long, env = "REPLICA_COUNT", default_value = "3")]
    replica_count: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Volume Manager");
    info!("  Version: {}", volume_manager::VERSION);
    info!("  Node: {} ({})", args.node_id, args.node_address);
    info!("  Engine image: {}", args.engine_image);

    let nodes = NodeRegistry::new(args.node_id.clone(), args.node_address.clone());
    let (manager, mut events) = VolumeManager::new(
        std::sync::Arc::new(MemoryDatastore::new()),
        std::sync::Arc::new(SimOrchestrator::new()),
        std::sync::Arc::new(SimEngineCollection::new()),
        nodes,
        args.engine_image.clone(),
    )?;

    // Drain notification events in the background so a burst never fills
    // the channel
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            info!(volume = %event.volume_name, "volume event");
        }
    });

    run_demo(&manager, &args).await?;

    manager.shutdown().await;
    info!("Volume manager shutdown complete");
    Ok(())
}

/// Walk one volume through create, attach, detach, and delete
async fn run_demo(manager: &VolumeManager, args: &Args) -> Result<()> {
    let name = "demo-vol";

    let volume = manager
        .volume_create(VolumeCreateRequest {
            name: name.to_string(),
            size: args.volume_size.clone(),
            from_backup: None,
            number_of_replicas: args.replica_count,
            stale_replica_timeout: 60,
        })
        .await?;
    info!(
        "created volume: {}",
        serde_json::to_string_pretty(&volume)
            .map_err(|e| Error::Internal(format!("failed to render volume record: {e}")))?
    );

    wait_for_state(manager, name, VolumeState::Detached).await?;
    info!(volume = name, "volume provisioned and detached");

    manager.volume_attach(name, &args.node_id).await?;
    wait_for_state(manager, name, VolumeState::Healthy).await?;
    let controller = manager.volume_controller_info(name).await?;
    info!(volume = name, controller = ?controller, "volume attached");

    let replicas = manager.volume_replica_list(name).await?;
    for replica in replicas.values() {
        info!(
            replica = %replica.name,
            address = %replica.address,
            running = replica.running,
            "replica"
        );
    }

    manager.volume_detach(name).await?;
    wait_for_state(manager, name, VolumeState::Detached).await?;
    info!(volume = name, "volume detached");

    manager.volume_delete(name).await?;
    wait_for_deleted(manager, name).await?;
    info!(volume = name, "volume deleted");
    Ok(())
}

// =============================================================================
// Convergence polling
// =============================================================================

const CONVERGE_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

async fn wait_for_state(
    manager: &VolumeManager,
    name: &str,
    state: VolumeState,
) -> Result<()> {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        // Wake the worker instead of waiting out its reconcile interval
        if let Some(managed) = manager.managed_volumes().get_resident(name).await {
            managed.notify();
        } else {
            manager.managed_volumes().get_or_create(name).await?.notify();
        }

        match manager.volume_info(name).await? {
            Some(volume) if volume.state == state => return Ok(()),
            Some(_) => {}
            None => {
                return Err(Error::VolumeNotFound {
                    name: name.to_string(),
                })
            }
        }
        if Instant::now() >= deadline {
            return Err(Error::Internal(format!(
                "volume {name} did not reach state {state} within {CONVERGE_TIMEOUT:?}"
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn wait_for_deleted(manager: &VolumeManager, name: &str) -> Result<()> {
    let deadline = Instant::now() + CONVERGE_TIMEOUT;
    loop {
        if let Some(managed) = manager.managed_volumes().get_resident(name).await {
            managed.notify();
        }
        match manager.volume_info(name).await? {
            None => return Ok(()),
            Some(volume) if volume.state == VolumeState::Deleted => return Ok(()),
            Some(_) => {}
        }
        if Instant::now() >= deadline {
            return Err(Error::Internal(format!(
                "volume {name} was not deleted within {CONVERGE_TIMEOUT:?}"
            )));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
