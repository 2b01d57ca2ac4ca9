//! Domain Ports - Core trait definitions for hardware preparation
//!
//! These traits define the boundaries between the preparation logic and the
//! host: the native fabric library, the PCI bus, the account database and
//! the setup script. Adapters implement these traits to provide concrete
//! functionality; tests substitute fakes.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Fabric Types
// =============================================================================

/// One result from a native fabric library query
pub trait Info {
    /// Fabric domain name, e.g. `mlx5_0` or `eth0`
    fn domain_name(&self) -> &str;

    /// OS network device backing the domain, empty if unknown
    fn os_name(&self) -> &str;

    /// Raw provider list, e.g. `verbs;ofi_rxm`
    fn fabric_provider(&self) -> &str;
}

/// A network-capable device usable by the engine's transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFabricInterface")]
pub struct FabricInterface {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    os_device: String,
    providers: BTreeSet<String>,
}

impl FabricInterface {
    /// Create an interface; fails if the name or the provider set is empty
    pub fn new<I, S>(name: impl Into<String>, os_device: impl Into<String>, providers: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::MissingField {
                field: "domain name",
            });
        }

        let providers: BTreeSet<String> = providers
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        if providers.is_empty() {
            return Err(Error::MissingField { field: "provider" });
        }

        Ok(Self {
            name,
            os_device: os_device.into(),
            providers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn os_device(&self) -> &str {
        &self.os_device
    }

    pub fn providers(&self) -> &BTreeSet<String> {
        &self.providers
    }

    /// Union another interface's providers into this one.
    ///
    /// The OS device is taken from `other` only if this one has none.
    pub fn merge(&mut self, other: FabricInterface) {
        if self.os_device.is_empty() {
            self.os_device = other.os_device;
        }
        self.providers.extend(other.providers);
    }
}

/// Unvalidated wire form of [`FabricInterface`]
#[derive(Deserialize)]
struct RawFabricInterface {
    name: String,
    #[serde(default)]
    os_device: String,
    #[serde(default)]
    providers: BTreeSet<String>,
}

impl TryFrom<RawFabricInterface> for FabricInterface {
    type Error = Error;

    fn try_from(raw: RawFabricInterface) -> Result<Self> {
        FabricInterface::new(raw.name, raw.os_device, raw.providers)
    }
}

/// Fabric interfaces keyed by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FabricInterfaceSet {
    interfaces: BTreeMap<String, FabricInterface>,
}

impl FabricInterfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interface, merging providers if the name is already present
    pub fn add(&mut self, iface: FabricInterface) {
        match self.interfaces.get_mut(iface.name()) {
            Some(existing) => existing.merge(iface),
            None => {
                self.interfaces.insert(iface.name().to_string(), iface);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&FabricInterface> {
        self.interfaces.get(name)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FabricInterface> {
        self.interfaces.values()
    }
}

impl<'de> Deserialize<'de> for FabricInterfaceSet {
    /// Keys are rebuilt from interface names; the map keys on the wire are ignored
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = BTreeMap::<String, FabricInterface>::deserialize(deserializer)?;
        let mut set = FabricInterfaceSet::new();
        for iface in wire.into_values() {
            set.add(iface);
        }
        Ok(set)
    }
}

// =============================================================================
// Bdev Preparation Types
// =============================================================================

/// Request to prepare or reset NVMe devices for the storage engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BdevPrepareRequest {
    /// Account the engine runs as; must exist on the host
    pub target_user: String,
    /// Number of hugepages to allocate, 0 selects the default
    pub hugepage_count: u32,
    /// Skip removal of stale hugepage files after prepare
    pub disable_clean_hugepages: bool,
    /// Comma separated PCI addresses to claim
    pub pci_allowlist: String,
    /// Comma separated PCI addresses to leave alone
    pub pci_blocklist: String,
    /// Bind to the generic UIO driver instead of VFIO
    pub disable_vfio: bool,
    /// Do not add VMD addresses to the allow-list
    pub disable_vmd: bool,
}

/// Result of a successful prepare
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BdevPrepareResponse {
    /// Stale hugepage files removed after the script ran
    pub nr_hugepages_removed: u32,
}

// =============================================================================
// Host Accounts
// =============================================================================

/// A resolved OS account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
    pub uid: u32,
    pub gid: u32,
}

// =============================================================================
// Ports
// =============================================================================

/// Source of raw fabric query results (the native library boundary).
///
/// `query` blocks and may take unbounded time.
pub trait InfoSource: Send + Sync {
    fn query(&self) -> Result<Vec<Box<dyn Info + Send>>>;
}

/// Probe for VMD-managed PCI addresses
pub trait VmdDetector: Send + Sync {
    /// Addresses of VMD endpoints; empty when the host has none
    fn detect_vmd(&self) -> Result<Vec<String>>;
}

/// Account database lookup
pub trait UserLookup: Send + Sync {
    /// Resolve a username, failing with `UnknownUser` if it does not exist
    fn lookup(&self, username: &str) -> Result<User>;
}

/// Port for fabric interface discovery
#[async_trait]
pub trait FabricDiscoverer: Send + Sync {
    /// Discover and aggregate all fabric interfaces on the host
    async fn get_fabric_interfaces(&self, cancel: &CancellationToken) -> Result<FabricInterfaceSet>;
}

/// Port for block device preparation
pub trait BdevPreparer: Send + Sync {
    /// Reset then prepare devices for the engine
    fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse>;

    /// Release devices back to the kernel
    fn reset(&self, req: &BdevPrepareRequest) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type InfoSourceRef = Arc<dyn InfoSource>;
pub type VmdDetectorRef = Arc<dyn VmdDetector>;
pub type UserLookupRef = Arc<dyn UserLookup>;
pub type FabricDiscovererRef = Arc<dyn FabricDiscoverer>;
pub type BdevPreparerRef = Arc<dyn BdevPreparer>;
