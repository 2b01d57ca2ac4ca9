//! Error types for engine hardware preparation
//!
//! Provides structured error types for fabric discovery, bdev preparation,
//! the external setup script and the host probes they depend on.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Phase of the setup script that produced an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Reset,
    Prepare,
}

impl fmt::Display for ScriptPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptPhase::Reset => write!(f, "reset"),
            ScriptPhase::Prepare => write!(f, "prepare"),
        }
    }
}

/// Unified error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // =========================================================================
    // Fabric Discovery Errors
    // =========================================================================
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("provider string is empty")]
    EmptyInput,

    #[error("provider string is malformed: {input:?}")]
    MalformedInput { input: String },

    #[error("fabric query cancelled")]
    Cancelled,

    #[error("fabric query timed out after {0:?}")]
    Timeout(Duration),

    // =========================================================================
    // Bdev Preparation Errors
    // =========================================================================
    #[error("bdev_include and bdev_exclude can not be used together")]
    ConflictingSelector,

    #[error("lookup on local host: user: unknown user {username}")]
    UnknownUser { username: String },

    #[error("{phase} phase of {script}: {source}")]
    ScriptFailed {
        phase: ScriptPhase,
        script: String,
        #[source]
        source: Box<Error>,
    },

    // =========================================================================
    // Host Probe Errors
    // =========================================================================
    #[error("VMD probe failed: {0}")]
    ProbeFailure(String),

    #[error("command failed: {command} ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    // =========================================================================
    // Parse / IO Errors
    // =========================================================================
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Errors the caller can fix by changing the request or the input
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::MissingField { .. }
                | Error::EmptyInput
                | Error::MalformedInput { .. }
                | Error::ConflictingSelector
                | Error::UnknownUser { .. }
                | Error::Configuration(_)
        )
    }

    /// Errors that may clear up if the whole operation is tried again later.
    ///
    /// Nothing in this crate retries on its own; this only informs callers.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Cancelled | Error::Timeout(_) | Error::ProbeFailure(_) => true,
            Error::ScriptFailed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    /// The script phase that failed, if this is a script failure
    pub fn script_phase(&self) -> Option<ScriptPhase> {
        match self {
            Error::ScriptFailed { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::ConflictingSelector.to_string(),
            "bdev_include and bdev_exclude can not be used together"
        );
        assert_eq!(
            Error::UnknownUser {
                username: "nobody_here".into()
            }
            .to_string(),
            "lookup on local host: user: unknown user nobody_here"
        );
        assert!(Error::MissingField {
            field: "domain name"
        }
        .to_string()
        .contains("domain name"));
    }

    #[test]
    fn test_script_failure_keeps_source_message() {
        let err = Error::ScriptFailed {
            phase: ScriptPhase::Reset,
            script: "setup_spdk.sh".into(),
            source: Box::new(Error::Internal("reset failed".into())),
        };

        assert!(err.to_string().contains("reset failed"));
        assert!(err.to_string().starts_with("reset phase"));
        assert_eq!(err.script_phase(), Some(ScriptPhase::Reset));
    }

    #[test]
    fn test_error_classification() {
        assert!(Error::ConflictingSelector.is_validation());
        assert!(Error::EmptyInput.is_validation());
        assert!(!Error::ConflictingSelector.is_transient());

        assert!(Error::Cancelled.is_transient());
        assert!(!Error::Cancelled.is_validation());

        let wrapped = Error::ScriptFailed {
            phase: ScriptPhase::Prepare,
            script: "setup_spdk.sh".into(),
            source: Box::new(Error::Timeout(Duration::from_secs(1))),
        };
        assert!(wrapped.is_transient());
    }
}
