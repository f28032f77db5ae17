//! Orchestrator adapters
//!
//! Engine and replica process lifecycle is consumed through the
//! [`Orchestrator`] port; this module provides the in-process adapter used
//! by the standalone binary and the test suite.
//!
//! [`Orchestrator`]: crate::domain::ports::Orchestrator

pub mod sim;

pub use sim::SimOrchestrator;
