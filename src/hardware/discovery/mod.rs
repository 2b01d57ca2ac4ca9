//! Hardware Discovery Module
//!
//! Probes the host PCI topology for devices that change how NVMe drives
//! are claimed.

pub mod vmd;

pub use vmd::*;
