//! Datastore adapters
//!
//! The durable source of truth is consumed through the [`Datastore`] port;
//! this module provides the in-memory adapter used by the standalone binary
//! and the test suite.
//!
//! [`Datastore`]: crate::domain::ports::Datastore

pub mod memory;

pub use memory::MemoryDatastore;
