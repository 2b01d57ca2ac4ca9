//! VMD Discovery
//!
//! Finds Volume Management Device endpoints. NVMe drives behind a VMD are
//! only reachable through the endpoint's PCI address, so preparation adds
//! these addresses to the allow-list.

use crate::config::{BdevConfig, VmdProbe};
use crate::domain::ports::{VmdDetector, VmdDetectorRef};
use crate::error::{Error, Result};
use crate::hardware::pci::is_pci_address;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Constants
// =============================================================================

const INTEL_VENDOR_ID: &str = "8086";

/// PCI device ids of Intel VMD endpoints
pub const VMD_DEVICE_IDS: &[&str] = &["201d", "28c0"];

const VMD_DRIVER_DIR: &str = "bus/pci/drivers/vmd";

/// Build the configured detector
pub fn vmd_detector(config: &BdevConfig) -> VmdDetectorRef {
    match config.vmd_probe {
        VmdProbe::Lspci => Arc::new(LspciVmdDetector::default()),
        VmdProbe::Sysfs => Arc::new(SysfsVmdDetector::new(config.sysfs_path.clone())),
    }
}

// =============================================================================
// lspci Detector
// =============================================================================

/// Detects VMD endpoints by device id with `lspci -D -n`
#[derive(Debug, Clone)]
pub struct LspciVmdDetector {
    binary: PathBuf,
}

impl Default for LspciVmdDetector {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("lspci"),
        }
    }
}

impl LspciVmdDetector {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Parse `lspci -D -n` output, keeping addresses of VMD endpoints.
    ///
    /// Lines look like `0000:5d:05.5 0104: 8086:201d (rev 04)`.
    pub fn parse_lspci(output: &str) -> Vec<String> {
        output
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let addr = fields.next()?;
                let _class = fields.next()?;
                let (vendor, device) = fields.next()?.split_once(':')?;

                let is_vmd = vendor.eq_ignore_ascii_case(INTEL_VENDOR_ID)
                    && VMD_DEVICE_IDS.iter().any(|id| device.eq_ignore_ascii_case(id));
                (is_vmd && is_pci_address(addr)).then(|| addr.to_string())
            })
            .collect()
    }
}

impl VmdDetector for LspciVmdDetector {
    fn detect_vmd(&self) -> Result<Vec<String>> {
        let output = Command::new(&self.binary)
            .args(["-D", "-n"])
            .output()
            .map_err(|e| Error::ProbeFailure(format!("{}: {}", self.binary.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::ProbeFailure(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        let addrs = Self::parse_lspci(&String::from_utf8_lossy(&output.stdout));
        debug!("Found {} VMD endpoints", addrs.len());
        Ok(addrs)
    }
}

// =============================================================================
// sysfs Detector
// =============================================================================

/// Detects VMD endpoints bound to the kernel `vmd` driver
#[derive(Debug, Clone)]
pub struct SysfsVmdDetector {
    sysfs_path: PathBuf,
}

impl SysfsVmdDetector {
    pub fn new(sysfs_path: impl Into<PathBuf>) -> Self {
        Self {
            sysfs_path: sysfs_path.into(),
        }
    }
}

impl VmdDetector for SysfsVmdDetector {
    fn detect_vmd(&self) -> Result<Vec<String>> {
        let driver_dir = self.sysfs_path.join(VMD_DRIVER_DIR);
        if !driver_dir.exists() {
            debug!("No vmd driver at {:?}", driver_dir);
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&driver_dir).map_err(|e| {
            Error::ProbeFailure(format!("Failed to read {}: {}", driver_dir.display(), e))
        })?;

        let mut addrs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::ProbeFailure(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if is_pci_address(&name) {
                addrs.push(name);
            }
        }
        addrs.sort();

        debug!("Found {} VMD endpoints", addrs.len());
        Ok(addrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_lspci() {
        let output = "\
0000:00:00.0 0600: 8086:2020 (rev 04)
0000:5d:05.5 0104: 8086:201d (rev 04)
0000:85:05.5 0104: 8086:201D (rev 04)
0000:d7:00.0 0108: 8086:0a54
0000:ae:00.5 0104: 8086:28c0
";

        assert_eq!(
            LspciVmdDetector::parse_lspci(output),
            vec!["0000:5d:05.5", "0000:85:05.5", "0000:ae:00.5"]
        );
    }

    #[test]
    fn test_parse_lspci_no_vmd() {
        assert!(LspciVmdDetector::parse_lspci("0000:00:00.0 0600: 8086:2020\n").is_empty());
        assert!(LspciVmdDetector::parse_lspci("").is_empty());
    }

    #[test]
    fn test_lspci_missing_is_probe_failure() {
        let detector = LspciVmdDetector::new("/nonexistent/lspci");
        assert!(matches!(detector.detect_vmd(), Err(Error::ProbeFailure(_))));
    }

    #[test]
    fn test_sysfs_detector() {
        let tmp = TempDir::new().unwrap();
        let driver = tmp.path().join(VMD_DRIVER_DIR);
        fs::create_dir_all(driver.join("0000:5d:05.5")).unwrap();
        fs::create_dir_all(driver.join("0000:17:05.5")).unwrap();
        fs::write(driver.join("new_id"), "").unwrap();
        fs::write(driver.join("bind"), "").unwrap();

        let detector = SysfsVmdDetector::new(tmp.path());
        assert_eq!(
            detector.detect_vmd().unwrap(),
            vec!["0000:17:05.5", "0000:5d:05.5"]
        );
    }

    #[test]
    fn test_sysfs_without_driver() {
        let tmp = TempDir::new().unwrap();
        let detector = SysfsVmdDetector::new(tmp.path());

        assert!(detector.detect_vmd().unwrap().is_empty());
    }
}
