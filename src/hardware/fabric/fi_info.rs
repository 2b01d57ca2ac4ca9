//! libfabric Query Adapter
//!
//! Queries libfabric through the `fi_info` utility and parses its record
//! output into [`Info`] values. Both the terse and the `-v` layouts are
//! understood:
//!
//! ```text
//! provider: verbs;ofi_rxm          fi_info:
//!     fabric: IB-0xfe80...             fi_fabric_attr:
//!     domain: mlx5_0                       prov_name: tcp;ofi_rxm
//!     ...                              fi_domain_attr:
//!                                          name: eth0
//!                                      nic:
//!                                          device_attr:
//!                                              name: eth0
//! ```

use crate::domain::ports::{Info, InfoSource};
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// One parsed `fi_info` record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FiInfoRecord {
    pub domain: String,
    pub os_name: String,
    pub provider: String,
}

impl Info for FiInfoRecord {
    fn domain_name(&self) -> &str {
        &self.domain
    }

    fn os_name(&self) -> &str {
        &self.os_name
    }

    fn fabric_provider(&self) -> &str {
        &self.provider
    }
}

impl FiInfoRecord {
    fn is_blank(&self) -> bool {
        self.domain.is_empty() && self.os_name.is_empty() && self.provider.is_empty()
    }
}

/// Parse `fi_info` output into records
pub fn parse_fi_info(output: &str) -> Vec<FiInfoRecord> {
    let mut records = Vec::new();
    let mut current = FiInfoRecord::default();
    let mut section = String::new();

    for line in output.lines() {
        let Some((key, value)) = line.trim().split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        if value.is_empty() {
            if key == "fi_info" && !current.is_blank() {
                records.push(std::mem::take(&mut current));
            }
            section = key.to_string();
            continue;
        }

        match key {
            "provider" => {
                if !current.provider.is_empty() {
                    records.push(std::mem::take(&mut current));
                }
                current.provider = value.to_string();
            }
            "prov_name" if current.provider.is_empty() => {
                current.provider = value.to_string();
            }
            "domain" => current.domain = value.to_string(),
            "name" if section == "fi_domain_attr" => current.domain = value.to_string(),
            "name" if section.ends_with("device_attr") => current.os_name = value.to_string(),
            _ => {}
        }
    }

    if !current.is_blank() {
        records.push(current);
    }
    records
}

/// [`InfoSource`] backed by the `fi_info` command
#[derive(Debug, Clone)]
pub struct FiInfoSource {
    binary: PathBuf,
    verbose: bool,
}

impl Default for FiInfoSource {
    fn default() -> Self {
        Self::new("fi_info")
    }
}

impl FiInfoSource {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            verbose: true,
        }
    }

    /// Use the terse record layout (no NIC details)
    pub fn terse(mut self) -> Self {
        self.verbose = false;
        self
    }
}

impl InfoSource for FiInfoSource {
    fn query(&self) -> Result<Vec<Box<dyn Info + Send>>> {
        let command = self.binary.display().to_string();
        let mut cmd = Command::new(&self.binary);
        if self.verbose {
            cmd.arg("-v");
        }

        debug!("Querying libfabric: {}", command);
        let output = cmd.output().map_err(|e| Error::CommandFailed {
            command: command.clone(),
            status: "spawn".into(),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            // fi_info exits non-zero when no provider matches
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("No data available") {
                return Ok(Vec::new());
            }
            return Err(Error::CommandFailed {
                command,
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        let records = parse_fi_info(&String::from_utf8_lossy(&output.stdout));
        debug!("libfabric returned {} records", records.len());

        Ok(records
            .into_iter()
            .map(|r| Box::new(r) as Box<dyn Info + Send>)
            .collect())
    }
}
