//! Subprocess execution with an explicit environment

use crate::error::{Error, Result};
use std::process::Command;
use std::sync::Arc;
use tracing::debug;

/// Runs `command args...` with exactly the given `KEY=VALUE` environment and
/// returns its standard output.
pub type RunCmdFn = Arc<dyn Fn(&[String], &str, &[String]) -> Result<String> + Send + Sync>;

/// The default [`RunCmdFn`]
pub fn default_runner() -> RunCmdFn {
    Arc::new(run_command)
}

/// Spawn a command with a cleared environment plus `env`.
///
/// A non-zero exit becomes [`Error::CommandFailed`] carrying the command's
/// stderr (or stdout if stderr is empty).
pub fn run_command(env: &[String], command: &str, args: &[String]) -> Result<String> {
    let cmd_line = if args.is_empty() {
        command.to_string()
    } else {
        format!("{} {}", command, args.join(" "))
    };
    debug!("running: {}", cmd_line);

    let output = Command::new(command)
        .args(args)
        .env_clear()
        .envs(env.iter().filter_map(|kv| kv.split_once('=')))
        .output()
        .map_err(|e| Error::CommandFailed {
            command: cmd_line.clone(),
            status: "spawn".into(),
            stderr: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        return Err(Error::CommandFailed {
            command: cmd_line,
            status: output.status.to_string(),
            stderr: detail,
        });
    }

    Ok(stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_env_is_exact() {
        let env = vec!["_TARGET_USER=engine".to_string(), "_NRHUGE=16".to_string()];
        let out = run_command(&env, "/usr/bin/env", &[]).unwrap();

        let mut lines: Vec<&str> = out.lines().collect();
        lines.sort_unstable();
        assert_eq!(lines, vec!["_NRHUGE=16", "_TARGET_USER=engine"]);
    }

    #[test]
    fn test_args_are_passed() {
        let out = run_command(&[], "/bin/echo", &["reset".to_string()]).unwrap();
        assert_eq!(out.trim(), "reset");
    }

    #[test]
    fn test_nonzero_exit() {
        let err = run_command(
            &[],
            "/bin/sh",
            &["-c".to_string(), "echo boom >&2; exit 3".to_string()],
        )
        .unwrap_err();

        assert_matches!(&err, Error::CommandFailed { stderr, .. } if stderr == "boom");
    }

    #[test]
    fn test_missing_command() {
        assert_matches!(
            run_command(&[], "/nonexistent/setup.sh", &[]),
            Err(Error::CommandFailed { .. })
        );
    }
}
