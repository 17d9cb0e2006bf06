//! Error types for the probe harness.
//!
//! Only harness-level failures live here. A probe that runs to completion and
//! reports missing constants or methods is a validation failure, returned as a
//! [`ValidationReport`](crate::session::ValidationReport) with `passed == false`.

use thiserror::Error;

/// Errors that can occur while preparing, running or driving a probe.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Entry command (or an environment tool) is not installed or not in PATH
    #[error("command `{command}` not found in PATH")]
    CommandNotFound { command: String },

    /// Entry command list is empty
    #[error("entry command is empty")]
    EmptyEntryCommand,

    /// Scoped working directory could not be created
    #[error("cannot create probe working directory: {0}")]
    WorkDir(#[source] std::io::Error),

    /// Subprocess could not be started for a reason other than a missing binary
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Probe did not finish within the configured limit
    #[error("probe timed out after {secs} seconds")]
    Timeout { secs: u64 },

    /// Probe was killed by a signal instead of exiting
    #[error("probe terminated abnormally (signal {signal:?})")]
    Terminated { signal: Option<i32> },

    /// Session was already run
    #[error("validation session for `{subject}` has already been run")]
    SessionConsumed { subject: String },

    /// Assertion manifest could not be parsed
    #[error("invalid assertion manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Whether this error stems from configuration (missing tool, bad work
    /// root) rather than from executing the probe itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            HarnessError::CommandNotFound { .. }
                | HarnessError::EmptyEntryCommand
                | HarnessError::WorkDir(_)
        )
    }

    /// Map a spawn failure onto the taxonomy: a missing binary is a
    /// configuration error, anything else is an execution failure.
    pub(crate) fn from_spawn(command: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            HarnessError::CommandNotFound {
                command: command.to_string(),
            }
        } else {
            HarnessError::SpawnFailed {
                command: command.to_string(),
                source: err,
            }
        }
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
