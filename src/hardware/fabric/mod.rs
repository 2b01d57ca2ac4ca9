//! Fabric Discovery Module
//!
//! Discovers network fabric interfaces through libfabric and normalizes
//! provider names for the engine's transport layer.

pub mod fi_info;
pub mod names;
pub mod provider;

pub use fi_info::*;
pub use names::*;
pub use provider::{info_to_fabric_interface, FabricProvider};
