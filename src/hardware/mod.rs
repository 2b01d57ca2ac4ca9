//! Hardware Module
//!
//! Provides fabric interface discovery, VMD discovery and NVMe device
//! preparation for the storage engine.

pub mod bdev;
pub mod discovery;
pub mod fabric;
pub mod pci;

pub use bdev::{
    BdevProvider, EnvBuilder, HugepageCleaner, PrepareState, ScriptEnv, SpdkBackend,
    SpdkSetupScript,
};
pub use discovery::{vmd_detector, LspciVmdDetector, SysfsVmdDetector};
pub use fabric::{
    info_to_fabric_interface, lib_fabric_provider_list_to_ext, parse_fi_info, FabricProvider,
    FiInfoRecord, FiInfoSource,
};
pub use pci::{is_pci_address, merge_pci_lists, parse_pci_list};
