//! Setup Script Environment
//!
//! Computes the exact environment handed to the setup script for a prepare
//! or reset request. Entry order is fixed:
//!
//! ```text
//! PATH=<inherited>
//! _NRHUGE=<count>
//! _TARGET_USER=<user>
//! _PCI_ALLOWED=<list> | _PCI_BLOCKED=<list>     (only when non-empty)
//! _DRIVER_OVERRIDE=uio_pci_generic              (only when VFIO disabled)
//! ```

use crate::config::DEFAULT_NR_HUGEPAGES;
use crate::domain::ports::{BdevPrepareRequest, User, UserLookupRef, VmdDetectorRef};
use crate::error::{Error, Result};
use crate::hardware::pci::{merge_pci_lists, parse_pci_list};
use tracing::{debug, warn};

// =============================================================================
// Environment Keys
// =============================================================================

pub const PATH_ENV: &str = "PATH";
pub const NR_HUGEPAGES_ENV: &str = "_NRHUGE";
pub const TARGET_USER_ENV: &str = "_TARGET_USER";
pub const PCI_ALLOW_LIST_ENV: &str = "_PCI_ALLOWED";
pub const PCI_BLOCK_LIST_ENV: &str = "_PCI_BLOCKED";
pub const DRIVER_OVERRIDE_ENV: &str = "_DRIVER_OVERRIDE";

/// Driver bound instead of vfio-pci when VFIO is disabled
pub const VFIO_DISABLED_DRIVER: &str = "uio_pci_generic";

/// A computed script environment and the account it was computed for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEnv {
    pub user: User,
    pub vars: Vec<String>,
}

/// Builds setup script environments from prepare requests
pub struct EnvBuilder {
    users: UserLookupRef,
    vmd: VmdDetectorRef,
    default_nr_hugepages: u32,
}

impl EnvBuilder {
    pub fn new(users: UserLookupRef, vmd: VmdDetectorRef) -> Self {
        Self {
            users,
            vmd,
            default_nr_hugepages: DEFAULT_NR_HUGEPAGES,
        }
    }

    /// Override the hugepage count used for requests that leave it at zero
    pub fn with_default_hugepages(mut self, count: u32) -> Self {
        self.default_nr_hugepages = count;
        self
    }

    /// Compute the script environment for a request
    pub fn build_prepare_env(&self, req: &BdevPrepareRequest) -> Result<Vec<String>> {
        self.build(req).map(|env| env.vars)
    }

    /// Validate the request and compute its environment.
    ///
    /// Nothing is returned on error and no external process is started.
    pub fn build(&self, req: &BdevPrepareRequest) -> Result<ScriptEnv> {
        if !req.pci_allowlist.is_empty() && !req.pci_blocklist.is_empty() {
            return Err(Error::ConflictingSelector);
        }

        let user = self.users.lookup(&req.target_user)?;

        let nr_hugepages = if req.hugepage_count == 0 {
            self.default_nr_hugepages
        } else {
            req.hugepage_count
        };

        let path = std::env::var(PATH_ENV).unwrap_or_default();
        let mut vars = vec![
            format!("{}={}", PATH_ENV, path),
            format!("{}={}", NR_HUGEPAGES_ENV, nr_hugepages),
            format!("{}={}", TARGET_USER_ENV, user.username),
        ];

        if !req.pci_blocklist.is_empty() {
            vars.push(format!("{}={}", PCI_BLOCK_LIST_ENV, req.pci_blocklist));
        } else {
            let allowlist = self.allowlist_with_vmd(req);
            if !allowlist.is_empty() {
                vars.push(format!("{}={}", PCI_ALLOW_LIST_ENV, allowlist));
            }
        }

        if req.disable_vfio {
            vars.push(format!("{}={}", DRIVER_OVERRIDE_ENV, VFIO_DISABLED_DRIVER));
        }

        debug!("setup script env for {}: {:?}", user.username, &vars[1..]);
        Ok(ScriptEnv { user, vars })
    }

    /// The request's allow-list with any VMD endpoint addresses appended.
    ///
    /// A failed probe counts as no VMD present. This can hide a broken probe
    /// on a host that does have VMD, so the failure is logged.
    fn allowlist_with_vmd(&self, req: &BdevPrepareRequest) -> String {
        if req.disable_vmd {
            return req.pci_allowlist.clone();
        }

        let vmd_addrs = match self.vmd.detect_vmd() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("VMD detection failed, continuing without VMD: {}", e);
                return req.pci_allowlist.clone();
            }
        };
        if vmd_addrs.is_empty() {
            return req.pci_allowlist.clone();
        }

        debug!("adding VMD addresses to allow-list: {:?}", vmd_addrs);
        merge_pci_lists(&parse_pci_list(&req.pci_allowlist), &vmd_addrs).join(",")
    }
}
