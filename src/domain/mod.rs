//! Domain layer - Core volume records and port definitions
//!
//! This module defines the durable record types and the traits (ports) that
//! external collaborators implement, following hexagonal architecture
//! principles.

pub mod ports;
pub mod volume;

pub use ports::*;
pub use volume::*;
