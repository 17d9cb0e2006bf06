//! Environment preparation ahead of a probe run.
//!
//! The probe runs "within the subject library's dependency environment". For
//! Ruby that means a `Gemfile` in the scoped directory and a successful
//! `bundle install`, which [`BundlerEnvironment`] provides.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::classify::{classify_output, Diagnostic};
use crate::error::{HarnessError, HarnessResult};
use crate::render::ruby_str;

/// Name of the generated Gemfile.
pub const GEMFILE_NAME: &str = "Gemfile";

/// Outcome of environment preparation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Preparation ran but failed; carries the tool's classified output.
    Failed(Vec<Diagnostic>),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// Prepares the dependency environment for one subject.
#[async_trait]
pub trait EnvironmentPreparer: Send + Sync {
    /// `Readiness::Failed` makes the session report a failed validation
    /// without rendering a probe. `Err` is reserved for harness failures
    /// such as a missing tool.
    async fn prepare(&self, subject: &str, workdir: &Path) -> HarnessResult<Readiness>;
}

/// Assumes the environment is already usable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreparation;

#[async_trait]
impl EnvironmentPreparer for NoPreparation {
    async fn prepare(&self, _subject: &str, _workdir: &Path) -> HarnessResult<Readiness> {
        Ok(Readiness::Ready)
    }
}

/// A gem line in the generated Gemfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GemRequirement {
    pub name: String,

    /// Version constraint, e.g. `"~> 1.2"`.
    #[serde(default)]
    pub version: Option<String>,

    /// Local checkout to use instead of a released gem.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl GemRequirement {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            path: None,
        }
    }

    fn gemfile_line(&self) -> String {
        let mut line = format!("gem {}", ruby_str(&self.name));
        if let Some(version) = &self.version {
            line.push_str(", ");
            line.push_str(&ruby_str(version));
        }
        if let Some(path) = &self.path {
            line.push_str(", path: ");
            line.push_str(&ruby_str(&path.to_string_lossy()));
        }
        line
    }
}

/// Writes a Gemfile for the subject (plus extra gems) and runs `bundle install`.
#[derive(Debug, Clone)]
pub struct BundlerEnvironment {
    source: String,
    subject_version: Option<String>,
    subject_path: Option<PathBuf>,
    extra_gems: Vec<GemRequirement>,
    install_command: Vec<String>,
    timeout_secs: u64,
}

impl Default for BundlerEnvironment {
    fn default() -> Self {
        Self {
            source: "https://rubygems.org".to_string(),
            subject_version: None,
            subject_path: None,
            extra_gems: Vec::new(),
            install_command: vec!["bundle".to_string(), "install".to_string()],
            timeout_secs: 600,
        }
    }
}

impl BundlerEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_subject_version(mut self, version: impl Into<String>) -> Self {
        self.subject_version = Some(version.into());
        self
    }

    pub fn with_subject_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.subject_path = Some(path.into());
        self
    }

    pub fn with_gem(mut self, gem: GemRequirement) -> Self {
        self.extra_gems.push(gem);
        self
    }

    pub fn with_install_command(mut self, command: Vec<String>) -> Self {
        self.install_command = command;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Gemfile contents for `subject`.
    pub fn gemfile(&self, subject: &str) -> String {
        let subject_gem = GemRequirement {
            name: subject.to_string(),
            version: self.subject_version.clone(),
            path: self.subject_path.clone(),
        };

        let mut out = format!("source {}\n\n", ruby_str(&self.source));
        for gem in std::iter::once(&subject_gem).chain(self.extra_gems.iter()) {
            out.push_str(&gem.gemfile_line());
            out.push('\n');
        }
        out
    }
}

#[async_trait]
impl EnvironmentPreparer for BundlerEnvironment {
    async fn prepare(&self, subject: &str, workdir: &Path) -> HarnessResult<Readiness> {
        let (exe, args) = self
            .install_command
            .split_first()
            .ok_or(HarnessError::EmptyEntryCommand)?;

        let gemfile = workdir.join(GEMFILE_NAME);
        tokio::fs::write(&gemfile, self.gemfile(subject)).await?;

        info!(subject = %subject, "Installing bundle");
        let child = Command::new(exe)
            .args(args)
            .current_dir(workdir)
            .env("BUNDLE_GEMFILE", &gemfile)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::from_spawn(exe, e))?;

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

        if output.status.success() {
            debug!(subject = %subject, "Bundle installed");
            return Ok(Readiness::Ready);
        }

        let mut raw = String::from_utf8_lossy(&output.stdout).into_owned();
        raw.push_str(&String::from_utf8_lossy(&output.stderr));
        let mut diagnostics = classify_output(&raw);
        if diagnostics.is_empty() {
            diagnostics.push(Diagnostic::error(format!(
                "`{}` exited with {}",
                self.install_command.join(" "),
                output.status
            )));
        }
        warn!(subject = %subject, lines = diagnostics.len(), "Bundle install failed");
        Ok(Readiness::Failed(diagnostics))
    }
}
