//! Configuration
//!
//! Settings for fabric discovery and bdev preparation. Every field has a
//! default, so an empty or partial YAML file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Constants
// =============================================================================

/// Setup script location relative to the directory of the running binary
pub const DEFAULT_SETUP_SCRIPT: &str = "../share/daos/control/setup_spdk.sh";

/// Hugepages allocated when a request leaves the count at zero
pub const DEFAULT_NR_HUGEPAGES: u32 = 4096;

const DEFAULT_HUGEPAGE_DIR: &str = "/dev/hugepages";
const DEFAULT_HUGEPAGE_PREFIX: &str = "spdk";

// =============================================================================
// Bdev Configuration
// =============================================================================

/// How VMD endpoints are probed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmdProbe {
    /// `lspci` by VMD device id
    Lspci,
    /// Devices bound to the `vmd` driver in sysfs
    Sysfs,
}

/// Configuration for bdev preparation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BdevConfig {
    /// Explicit setup script path; resolved next to the binary if unset
    pub setup_script_path: Option<PathBuf>,
    /// Hugepage count used when the request does not specify one
    pub default_nr_hugepages: u32,
    /// Hugepage filesystem mount
    pub hugepage_dir: PathBuf,
    /// File name prefix of hugepage files created by the engine
    pub hugepage_prefix: String,
    /// VMD probe strategy
    pub vmd_probe: VmdProbe,
    /// Path to sysfs (for testing)
    pub sysfs_path: PathBuf,
}

impl Default for BdevConfig {
    fn default() -> Self {
        Self {
            setup_script_path: None,
            default_nr_hugepages: DEFAULT_NR_HUGEPAGES,
            hugepage_dir: PathBuf::from(DEFAULT_HUGEPAGE_DIR),
            hugepage_prefix: DEFAULT_HUGEPAGE_PREFIX.to_string(),
            vmd_probe: VmdProbe::Lspci,
            sysfs_path: PathBuf::from("/sys"),
        }
    }
}

impl BdevConfig {
    /// Locate the setup script, failing if it does not exist
    pub fn resolve_setup_script(&self) -> Result<PathBuf> {
        let path = match &self.setup_script_path {
            Some(path) => path.clone(),
            None => {
                let exe = std::env::current_exe()?;
                let dir = exe.parent().ok_or_else(|| {
                    Error::Configuration(format!("no parent directory for {}", exe.display()))
                })?;
                dir.join(DEFAULT_SETUP_SCRIPT)
            }
        };

        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "setup script not found at {}",
                path.display()
            )));
        }
        Ok(path)
    }
}

// =============================================================================
// Fabric Configuration
// =============================================================================

/// Configuration for fabric discovery
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    /// `fi_info` binary
    pub fi_info_path: PathBuf,
    /// Request NIC details from `fi_info -v`
    pub verbose_query: bool,
    /// Give up on the query after this many seconds, 0 waits forever
    pub query_timeout_secs: u64,
}

impl Default for FabricConfig {
    fn default() -> Self {
        Self {
            fi_info_path: PathBuf::from("fi_info"),
            verbose_query: true,
            query_timeout_secs: 10,
        }
    }
}

impl FabricConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        (self.query_timeout_secs > 0).then(|| Duration::from_secs(self.query_timeout_secs))
    }
}

// =============================================================================
// Combined Configuration
// =============================================================================

/// Combined configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HwPrepConfig {
    pub bdev: BdevConfig,
    pub fabric: FabricConfig,
}

impl HwPrepConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_defaults() {
        let config = HwPrepConfig::default();

        assert_eq!(config.bdev.default_nr_hugepages, 4096);
        assert_eq!(config.bdev.hugepage_dir, PathBuf::from("/dev/hugepages"));
        assert_eq!(config.bdev.vmd_probe, VmdProbe::Lspci);
        assert_eq!(config.fabric.query_timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_partial_yaml() {
        let config = HwPrepConfig::from_yaml(
            "bdev:\n  default_nr_hugepages: 512\n  vmd_probe: sysfs\nfabric:\n  query_timeout_secs: 0\n",
        )
        .unwrap();

        assert_eq!(config.bdev.default_nr_hugepages, 512);
        assert_eq!(config.bdev.vmd_probe, VmdProbe::Sysfs);
        assert_eq!(config.bdev.hugepage_prefix, "spdk");
        assert_eq!(config.fabric.query_timeout(), None);
        assert!(config.fabric.verbose_query);
    }

    #[test]
    fn test_empty_yaml() {
        let config = HwPrepConfig::from_yaml("  \n").unwrap();
        assert_eq!(config.bdev.default_nr_hugepages, DEFAULT_NR_HUGEPAGES);
    }

    #[test]
    fn test_bad_yaml() {
        assert!(matches!(
            HwPrepConfig::from_yaml("bdev: [1, 2"),
            Err(Error::YamlParse(_))
        ));
    }

    #[test]
    fn test_resolve_setup_script() {
        let tmp = TempDir::new().unwrap();
        let script = tmp.path().join("setup_spdk.sh");
        std::fs::write(&script, "#!/bin/sh\n").unwrap();

        let mut config = BdevConfig {
            setup_script_path: Some(script.clone()),
            ..Default::default()
        };
        assert_eq!(config.resolve_setup_script().unwrap(), script);

        config.setup_script_path = Some(tmp.path().join("missing.sh"));
        assert!(matches!(
            config.resolve_setup_script(),
            Err(Error::Configuration(_))
        ));
    }
}
