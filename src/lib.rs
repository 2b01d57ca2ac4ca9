//! Engine Hardware Preparation
//!
//! Hardware preparation and discovery layer of a storage-engine control
//! plane: finds usable fabric interfaces through libfabric and prepares NVMe
//! devices for exclusive use by a user-space storage engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────┐   ┌──────────────────────────────────┐
//! │       Fabric Discovery           │   │        Bdev Preparation          │
//! │                                  │   │                                  │
//! │  FabricProvider                  │   │  BdevProvider                    │
//! │    │  (cancellable query)        │   │    │                             │
//! │    ▼                             │   │    ▼                             │
//! │  InfoSource (fi_info)            │   │  SpdkBackend                     │
//! │    │                             │   │    ├─ EnvBuilder ── VmdDetector  │
//! │    ▼                             │   │    │       └─────── UserLookup   │
//! │  info_to_fabric_interface        │   │    ├─ SpdkSetupScript (reset)    │
//! │    └─ provider name translation  │   │    ├─ SpdkSetupScript (prepare)  │
//! │    ▼                             │   │    └─ HugepageCleaner            │
//! │  FabricInterfaceSet              │   │                                  │
//! └──────────────────────────────────┘   └──────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`hardware`]: Fabric discovery, VMD discovery and bdev preparation
//! - [`system`]: Account lookup and subprocess execution
//! - [`domain`]: Core types and port traits
//! - [`config`]: Configuration
//! - [`error`]: Error types and handling

pub mod config;
pub mod domain;
pub mod error;
pub mod hardware;
pub mod system;

// Re-export commonly used types
pub use config::{BdevConfig, FabricConfig, HwPrepConfig, VmdProbe};

pub use domain::ports::{
    BdevPrepareRequest, BdevPrepareResponse, BdevPreparer, FabricDiscoverer, FabricInterface,
    FabricInterfaceSet, Info, InfoSource, User, UserLookup, VmdDetector,
};

pub use error::{Error, Result, ScriptPhase};

pub use hardware::{
    info_to_fabric_interface, lib_fabric_provider_list_to_ext, BdevProvider, EnvBuilder,
    FabricProvider, FiInfoSource, HugepageCleaner, LspciVmdDetector, SpdkBackend,
    SpdkSetupScript, SysfsVmdDetector,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
