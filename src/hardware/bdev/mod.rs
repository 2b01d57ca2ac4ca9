//! Bdev Preparation Module
//!
//! Prepares NVMe devices for exclusive use by the user-space storage
//! engine: computes the setup script environment, resets and re-binds
//! devices, and cleans up stale hugepages.

pub mod backend;
pub mod env;
pub mod hugepages;
pub mod provider;
pub mod script;

pub use backend::{PrepareState, SpdkBackend};
pub use env::*;
pub use hugepages::HugepageCleaner;
pub use provider::BdevProvider;
pub use script::SpdkSetupScript;
