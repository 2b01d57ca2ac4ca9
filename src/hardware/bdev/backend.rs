//! SPDK Backend
//!
//! Runs the two-phase preparation: the script is always reset first so
//! stale driver bindings and hugepage allocations from a previous run are
//! released before new bindings are applied.
//!
//! ```text
//! Idle ──► Resetting ──► Preparing ──► Done
//!              │              │
//!              └──► Failed ◄──┘
//! ```

use super::env::{EnvBuilder, ScriptEnv};
use super::hugepages::HugepageCleaner;
use super::script::SpdkSetupScript;
use crate::config::BdevConfig;
use crate::domain::ports::{BdevPrepareRequest, BdevPrepareResponse, BdevPreparer};
use crate::error::Result;
use std::fmt;
use tracing::{debug, warn};

/// Progress of a prepare or reset call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareState {
    Idle,
    Resetting,
    Preparing,
    Done,
    Failed,
}

impl fmt::Display for PrepareState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrepareState::Idle => write!(f, "idle"),
            PrepareState::Resetting => write!(f, "resetting"),
            PrepareState::Preparing => write!(f, "preparing"),
            PrepareState::Done => write!(f, "done"),
            PrepareState::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks state transitions for one call
struct Transitions {
    state: PrepareState,
}

impl Transitions {
    fn new() -> Self {
        Self {
            state: PrepareState::Idle,
        }
    }

    fn enter(&mut self, next: PrepareState) {
        debug!("bdev {} -> {}", self.state, next);
        self.state = next;
    }

    /// Record the outcome of the current step, moving to `Failed` on error
    fn step<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.enter(PrepareState::Failed);
        }
        result
    }
}

/// Prepares NVMe devices with the SPDK setup script
pub struct SpdkBackend {
    env: EnvBuilder,
    script: SpdkSetupScript,
    hugepages: HugepageCleaner,
}

impl SpdkBackend {
    pub fn new(env: EnvBuilder, script: SpdkSetupScript) -> Self {
        let defaults = BdevConfig::default();
        Self {
            env,
            script,
            hugepages: HugepageCleaner::new(defaults.hugepage_dir, defaults.hugepage_prefix),
        }
    }

    /// Clean stale hugepage files with `cleaner` after prepare
    pub fn with_hugepage_cleaner(mut self, cleaner: HugepageCleaner) -> Self {
        self.hugepages = cleaner;
        self
    }

    fn clean_hugepages(&self, env: &ScriptEnv) -> u32 {
        match self.hugepages.clean(env.user.uid) {
            Ok(removed) => removed,
            Err(e) => {
                warn!(
                    "Failed to clean hugepages in {}: {}",
                    self.hugepages.dir().display(),
                    e
                );
                0
            }
        }
    }
}

impl BdevPreparer for SpdkBackend {
    fn prepare(&self, req: &BdevPrepareRequest) -> Result<BdevPrepareResponse> {
        let mut fsm = Transitions::new();

        let env = fsm.step(self.env.build(req))?;

        fsm.enter(PrepareState::Resetting);
        fsm.step(self.script.reset(&env.vars))?;

        fsm.enter(PrepareState::Preparing);
        fsm.step(self.script.prepare(&env.vars))?;

        let nr_hugepages_removed = if req.disable_clean_hugepages {
            0
        } else {
            self.clean_hugepages(&env)
        };

        fsm.enter(PrepareState::Done);
        Ok(BdevPrepareResponse {
            nr_hugepages_removed,
        })
    }

    fn reset(&self, req: &BdevPrepareRequest) -> Result<()> {
        let mut fsm = Transitions::new();

        let env = fsm.step(self.env.build(req))?;

        fsm.enter(PrepareState::Resetting);
        fsm.step(self.script.reset(&env.vars))?;

        fsm.enter(PrepareState::Done);
        Ok(())
    }
}
