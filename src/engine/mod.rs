//! Engine API adapters
//!
//! The running storage-engine processes are consumed through the
//! [`EngineClient`] and [`EngineClientCollection`] ports; this module
//! provides the simulated adapter used by the standalone binary and the
//! test suite.
//!
//! [`EngineClient`]: crate::domain::ports::EngineClient
//! [`EngineClientCollection`]: crate::domain::ports::EngineClientCollection

pub mod sim;

pub use sim::SimEngineCollection;
