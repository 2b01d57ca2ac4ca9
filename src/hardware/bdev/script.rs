//! SPDK Setup Script
//!
//! Thin wrapper over the external script that binds NVMe devices to a
//! user-space driver and allocates hugepages. The script is run through an
//! injectable [`RunCmdFn`] so tests can record or fail invocations.

use crate::error::{Error, Result, ScriptPhase};
use crate::system::{default_runner, RunCmdFn};
use std::path::Path;
use tracing::debug;

/// Argument that makes the script release devices back to the kernel
pub const RESET_ARG: &str = "reset";

/// Invokes the setup script
pub struct SpdkSetupScript {
    script_path: String,
    run_cmd: RunCmdFn,
}

impl SpdkSetupScript {
    /// Script at `script_path`, run with the default subprocess runner
    pub fn new(script_path: impl AsRef<Path>) -> Self {
        Self::with_runner(script_path, default_runner())
    }

    pub fn with_runner(script_path: impl AsRef<Path>, run_cmd: RunCmdFn) -> Self {
        Self {
            script_path: script_path.as_ref().display().to_string(),
            run_cmd,
        }
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    /// Unbind devices and release hugepages from a previous run
    pub fn reset(&self, env: &[String]) -> Result<()> {
        self.run(ScriptPhase::Reset, env, &[RESET_ARG.to_string()])
    }

    /// Bind devices and allocate hugepages as described by `env`
    pub fn prepare(&self, env: &[String]) -> Result<()> {
        self.run(ScriptPhase::Prepare, env, &[])
    }

    fn run(&self, phase: ScriptPhase, env: &[String], args: &[String]) -> Result<()> {
        let output = (self.run_cmd)(env, &self.script_path, args).map_err(|e| Error::ScriptFailed {
            phase,
            script: self.script_path.clone(),
            source: Box::new(e),
        })?;

        if !output.trim().is_empty() {
            debug!("{} output:\n{}", phase, output.trim_end());
        }
        Ok(())
    }
}
