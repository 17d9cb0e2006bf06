//! Probe execution: run a rendered probe and capture what it reports.
//!
//! Executors never interpret output; that is the classifier's job.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult};
use crate::oracle::{evaluate_probe, RuntimeOracle};
use crate::render::Probe;

/// File name the probe is written under inside the scoped working directory.
pub const PROBE_FILE_NAME: &str = "test.rb";

/// Outcome of one probe execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    /// Whether the process exited with status zero.
    pub exit_succeeded: bool,

    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,

    /// Combined stdout and stderr.
    pub raw_output: String,
}

/// Runs a probe inside a scoped working directory.
#[async_trait]
pub trait ProbeExecutor: Send + Sync {
    /// Execute `probe` with `workdir` as the working directory.
    async fn execute(&self, probe: &Probe, workdir: &Path) -> HarnessResult<ProbeResult>;
}

/// Executes the probe as a real subprocess via the configured entry command.
#[derive(Debug, Clone)]
pub struct SubprocessExecutor {
    entry_command: Vec<String>,
    timeout_secs: u64,
}

impl SubprocessExecutor {
    pub fn new(entry_command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            entry_command,
            timeout_secs,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self::new(config.entry_command.clone(), config.timeout_secs)
    }
}

#[async_trait]
impl ProbeExecutor for SubprocessExecutor {
    async fn execute(&self, probe: &Probe, workdir: &Path) -> HarnessResult<ProbeResult> {
        let (exe, args) = self
            .entry_command
            .split_first()
            .ok_or(HarnessError::EmptyEntryCommand)?;

        tokio::fs::write(workdir.join(PROBE_FILE_NAME), &probe.text).await?;

        let start = Instant::now();
        let child = Command::new(exe)
            .args(args)
            .arg(PROBE_FILE_NAME)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::from_spawn(exe, e))?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| HarnessError::Timeout {
                secs: self.timeout_secs,
            })??
        } else {
            child.wait_with_output().await?
        };

        let exit_code = output.status.code();
        if exit_code.is_none() {
            return Err(HarnessError::Terminated {
                signal: exit_signal(&output.status),
            });
        }

        let mut raw_output = String::from_utf8_lossy(&output.stdout).into_owned();
        raw_output.push_str(&String::from_utf8_lossy(&output.stderr));

        debug!(
            exit_code = ?exit_code,
            duration_ms = start.elapsed().as_millis() as u64,
            "Probe process exited"
        );

        Ok(ProbeResult {
            exit_succeeded: output.status.success(),
            exit_code,
            raw_output,
        })
    }
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

/// Replays the probe in-process against a [`RuntimeOracle`].
///
/// Still writes the script into the working directory so the on-disk
/// artifact matches what a subprocess run would leave behind.
#[derive(Clone)]
pub struct OracleExecutor {
    oracle: Arc<dyn RuntimeOracle>,
}

impl OracleExecutor {
    pub fn new(oracle: Arc<dyn RuntimeOracle>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl ProbeExecutor for OracleExecutor {
    async fn execute(&self, probe: &Probe, workdir: &Path) -> HarnessResult<ProbeResult> {
        tokio::fs::write(workdir.join(PROBE_FILE_NAME), &probe.text).await?;
        Ok(evaluate_probe(&probe.directives, self.oracle.as_ref()))
    }
}
