//! Bdev Provider
//!
//! Public entry point for preparing and resetting NVMe devices.

use super::backend::SpdkBackend;
use super::env::EnvBuilder;
use super::hugepages::HugepageCleaner;
use super::script::SpdkSetupScript;
use crate::config::BdevConfig;
use crate::domain::ports::{BdevPrepareRequest, BdevPrepareResponse, BdevPreparer, BdevPreparerRef};
use crate::error::Result;
use crate::hardware::discovery::vmd_detector;
use crate::system::SystemUserLookup;
use std::sync::Arc;
use tracing::info;

/// Prepares and resets NVMe devices through a backend.
///
/// Holds no mutable state. Callers must not run more than one prepare or
/// reset per host at a time; the script mutates host-wide driver bindings
/// and the hugepage pool.
pub struct BdevProvider {
    backend: BdevPreparerRef,
}

impl BdevProvider {
    pub fn new(backend: BdevPreparerRef) -> Self {
        Self { backend }
    }

    /// Build the SPDK backend described by `config`
    pub fn from_config(config: &BdevConfig) -> Result<Self> {
        let script = SpdkSetupScript::new(config.resolve_setup_script()?);
        let env = EnvBuilder::new(Arc::new(SystemUserLookup), vmd_detector(config))
            .with_default_hugepages(config.default_nr_hugepages);
        let backend = SpdkBackend::new(env, script).with_hugepage_cleaner(HugepageCleaner::new(
            config.hugepage_dir.clone(),
            config.hugepage_prefix.clone(),
        ));

        Ok(Self::new(Arc::new(backend)))
    }
}

impl BdevPreparer for BdevProvider {
    fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        info!("Preparing NVMe devices for user {}", req.target_user);
        let resp = self.backend.prepare(req)?;
        info!("NVMe devices prepared");
        Ok(resp)
    }

    fn reset(&self, req: &BdevPrepareRequest) -> Result<()> {
        info!("Resetting NVMe devices");
        self.backend.reset(req)?;
        info!("NVMe devices reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::bdev::backend::tests::{mock_runner, MockBackendConfig, Recorder};
    use crate::hardware::bdev::env::tests::FakeVmdDetector;
    use crate::hardware::bdev::env::{
        DRIVER_OVERRIDE_ENV, NR_HUGEPAGES_ENV, PCI_ALLOW_LIST_ENV, PCI_BLOCK_LIST_ENV,
        TARGET_USER_ENV, VFIO_DISABLED_DRIVER,
    };
    use crate::config::DEFAULT_NR_HUGEPAGES;
    use crate::system::current_username;
    use tempfile::TempDir;

    const TEST_NR_HUGEPAGES: u32 = 42;
    const NONEXISTENT_TARGET_USER: &str = "nonexistentTargetUser";
    const TEST_PCI_ALLOWLIST: &str = "a,b,c";
    const TEST_PCI_BLOCKLIST: &str = "x,y,z";
    const TEST_VMD_ADDR: &str = "0000:5d:05.5";

    struct Case {
        name: &'static str,
        req: BdevPrepareRequest,
        mbc: MockBackendConfig,
        vmd: bool,
        exp_env: Vec<String>,
        exp_err: Option<&'static str>,
    }

    #[test]
    fn test_provider_prepare() {
        let username = current_username().unwrap();
        let path = format!("PATH={}", std::env::var("PATH").unwrap_or_default());
        let hugepages = |n: u32| format!("{}={}", NR_HUGEPAGES_ENV, n);
        let user = format!("{}={}", TARGET_USER_ENV, username);
        let driver = format!("{}={}", DRIVER_OVERRIDE_ENV, VFIO_DISABLED_DRIVER);

        let user_specified = BdevPrepareRequest {
            hugepage_count: TEST_NR_HUGEPAGES,
            disable_clean_hugepages: true,
            target_user: username.clone(),
            pci_allowlist: TEST_PCI_ALLOWLIST.into(),
            disable_vfio: true,
            ..Default::default()
        };
        let blocklist = BdevPrepareRequest {
            pci_allowlist: String::new(),
            pci_blocklist: TEST_PCI_BLOCKLIST.into(),
            ..user_specified.clone()
        };
        let defaults = BdevPrepareRequest {
            target_user: username.clone(),
            ..Default::default()
        };

        let cases = vec![
            Case {
                name: "prepare reset fails",
                req: defaults.clone(),
                mbc: MockBackendConfig {
                    reset_err: Some("reset failed".into()),
                    ..Default::default()
                },
                vmd: false,
                exp_env: vec![],
                exp_err: Some("reset failed"),
            },
            Case {
                name: "prepare fails",
                req: defaults.clone(),
                mbc: MockBackendConfig {
                    prepare_err: Some("prepare failed".into()),
                    ..Default::default()
                },
                vmd: false,
                exp_env: vec![],
                exp_err: Some("prepare failed"),
            },
            Case {
                name: "defaults",
                req: defaults.clone(),
                mbc: MockBackendConfig::default(),
                vmd: false,
                exp_env: vec![path.clone(), hugepages(DEFAULT_NR_HUGEPAGES), user.clone()],
                exp_err: None,
            },
            Case {
                name: "defaults with vmd present",
                req: defaults.clone(),
                mbc: MockBackendConfig::default(),
                vmd: true,
                exp_env: vec![
                    path.clone(),
                    hugepages(DEFAULT_NR_HUGEPAGES),
                    user.clone(),
                    format!("{}={}", PCI_ALLOW_LIST_ENV, TEST_VMD_ADDR),
                ],
                exp_err: None,
            },
            Case {
                name: "defaults with vmd present and disabled",
                req: BdevPrepareRequest {
                    disable_vmd: true,
                    ..defaults.clone()
                },
                mbc: MockBackendConfig::default(),
                vmd: true,
                exp_env: vec![path.clone(), hugepages(DEFAULT_NR_HUGEPAGES), user.clone()],
                exp_err: None,
            },
            Case {
                name: "user-specified values",
                req: user_specified.clone(),
                mbc: MockBackendConfig::default(),
                vmd: false,
                exp_env: vec![
                    path.clone(),
                    hugepages(TEST_NR_HUGEPAGES),
                    user.clone(),
                    format!("{}={}", PCI_ALLOW_LIST_ENV, TEST_PCI_ALLOWLIST),
                    driver.clone(),
                ],
                exp_err: None,
            },
            Case {
                name: "user-specified values with vmd present",
                req: user_specified.clone(),
                mbc: MockBackendConfig::default(),
                vmd: true,
                exp_env: vec![
                    path.clone(),
                    hugepages(TEST_NR_HUGEPAGES),
                    user.clone(),
                    format!("{}={},{}", PCI_ALLOW_LIST_ENV, TEST_PCI_ALLOWLIST, TEST_VMD_ADDR),
                    driver.clone(),
                ],
                exp_err: None,
            },
            Case {
                name: "blocklist",
                req: blocklist.clone(),
                mbc: MockBackendConfig::default(),
                vmd: false,
                exp_env: vec![
                    path.clone(),
                    hugepages(TEST_NR_HUGEPAGES),
                    user.clone(),
                    format!("{}={}", PCI_BLOCK_LIST_ENV, TEST_PCI_BLOCKLIST),
                    driver.clone(),
                ],
                exp_err: None,
            },
            Case {
                name: "blocklist with vmd present",
                req: blocklist.clone(),
                mbc: MockBackendConfig::default(),
                vmd: true,
                exp_env: vec![
                    path.clone(),
                    hugepages(TEST_NR_HUGEPAGES),
                    user.clone(),
                    format!("{}={}", PCI_BLOCK_LIST_ENV, TEST_PCI_BLOCKLIST),
                    driver.clone(),
                ],
                exp_err: None,
            },
            Case {
                name: "blocklist allowlist fails",
                req: BdevPrepareRequest {
                    pci_allowlist: TEST_PCI_ALLOWLIST.into(),
                    ..blocklist.clone()
                },
                mbc: MockBackendConfig::default(),
                vmd: false,
                exp_env: vec![],
                exp_err: Some("bdev_include and bdev_exclude can not be used together"),
            },
            Case {
                name: "unknown target user fails",
                req: BdevPrepareRequest {
                    disable_clean_hugepages: true,
                    target_user: NONEXISTENT_TARGET_USER.into(),
                    disable_vfio: true,
                    ..Default::default()
                },
                mbc: MockBackendConfig::default(),
                vmd: false,
                exp_env: vec![],
                exp_err: Some("lookup on local host: user: unknown user nonexistentTargetUser"),
            },
        ];

        for tc in cases {
            let tmp = TempDir::new().unwrap();
            let recorder = Arc::new(Recorder::default());
            let vmd = if tc.vmd {
                FakeVmdDetector::with(&[TEST_VMD_ADDR])
            } else {
                FakeVmdDetector::none()
            };

            let script = SpdkSetupScript::with_runner(
                "setup_spdk.sh",
                mock_runner(tc.mbc.clone(), recorder.clone()),
            );
            let env = EnvBuilder::new(Arc::new(SystemUserLookup), Arc::new(vmd));
            let backend = SpdkBackend::new(env, script)
                .with_hugepage_cleaner(HugepageCleaner::new(tmp.path(), "spdk"));
            let provider = BdevProvider::new(Arc::new(backend));

            let result = provider.prepare(&tc.req);

            match tc.exp_err {
                Some(want) => {
                    let err = result.expect_err(tc.name);
                    assert!(
                        err.to_string().contains(want),
                        "{}: unexpected error {}",
                        tc.name,
                        err
                    );
                    if tc.mbc.reset_err.is_some() {
                        assert!(recorder.prepare_env().is_none(), "{}", tc.name);
                    }
                }
                None => {
                    result.unwrap_or_else(|e| panic!("{}: {}", tc.name, e));
                    assert_eq!(
                        recorder.prepare_env(),
                        Some(tc.exp_env),
                        "{}: unexpected cmd env",
                        tc.name
                    );
                }
            }
        }
    }
}
