//! Validation session: one subject library, one probe, one run.
//!
//! A session accumulates directives, then `run()` prepares the environment,
//! renders the probe, executes it inside a scoped working directory and
//! classifies the output. Sessions are single-use: a second `run()` fails with
//! [`HarnessError::SessionConsumed`] instead of re-running.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{info, info_span, warn, Instrument};

use crate::classify::{classify, Diagnostic};
use crate::config::HarnessConfig;
use crate::directive::{Directive, DirectiveList};
use crate::environment::{BundlerEnvironment, EnvironmentPreparer, NoPreparation, Readiness};
use crate::error::{HarnessError, HarnessResult};
use crate::executor::{OracleExecutor, ProbeExecutor, SubprocessExecutor};
use crate::oracle::RuntimeOracle;
use crate::render::render_probe;
use crate::sink::{DiagnosticSink, TracingSink};

/// Outcome of a session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Subject library that was validated.
    pub subject: String,

    /// Whether every check passed.
    pub passed: bool,

    /// Classified output of a failed probe, in output order.
    pub diagnostics: Vec<Diagnostic>,

    /// False when environment preparation failed and no probe ran; the
    /// preparation output is then in `diagnostics`.
    pub environment_ready: bool,

    /// Digest of the rendered probe, when one was rendered.
    pub probe_digest: Option<String>,

    /// Exit code of the probe, when it ran and exited normally.
    pub exit_code: Option<i32>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl ValidationReport {
    /// Number of error-severity diagnostics.
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Number of note-severity diagnostics.
    pub fn note_count(&self) -> usize {
        self.diagnostics.len() - self.error_count()
    }
}

/// Scoped working directory, removed on drop unless kept.
enum WorkDir {
    Scoped(TempDir),
    Kept(PathBuf),
}

impl WorkDir {
    fn create(config: &HarnessConfig, subject: &str) -> HarnessResult<Self> {
        let prefix = format!("surface-probe-{}-", sanitize(subject));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &config.work_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(HarnessError::WorkDir)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(HarnessError::WorkDir)?;

        if config.keep_workdir {
            #[allow(deprecated)]
            let path = dir.into_path();
            info!(path = %path.display(), "Keeping probe working directory");
            Ok(WorkDir::Kept(path))
        } else {
            Ok(WorkDir::Scoped(dir))
        }
    }

    fn path(&self) -> &Path {
        match self {
            WorkDir::Scoped(dir) => dir.path(),
            WorkDir::Kept(path) => path.as_path(),
        }
    }
}

fn sanitize(subject: &str) -> String {
    subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect()
}

/// Validation of one subject library.
///
/// Not shareable across threads while being built; independent sessions may
/// run concurrently, each in its own working directory.
pub struct ValidationSession {
    subject: String,
    directives: DirectiveList,
    config: HarnessConfig,
    executor: Arc<dyn ProbeExecutor>,
    environment: Arc<dyn EnvironmentPreparer>,
    sink: Arc<dyn DiagnosticSink>,
    consumed: bool,
}

impl ValidationSession {
    /// Session that installs a Gemfile for the subject and runs the probe as
    /// a subprocess, both using `config`.
    pub fn new(subject: impl Into<String>, config: HarnessConfig) -> Self {
        let executor = Arc::new(SubprocessExecutor::from_config(&config));
        let environment = Arc::new(
            BundlerEnvironment::new()
                .with_install_command(config.install_command.clone())
                .with_timeout_secs(config.timeout_secs),
        );
        Self {
            subject: subject.into(),
            directives: DirectiveList::new(),
            config,
            executor,
            environment,
            sink: Arc::new(TracingSink),
            consumed: false,
        }
    }

    /// Session that replays the probe against `oracle` instead of a subprocess.
    pub fn with_oracle(subject: impl Into<String>, oracle: Arc<dyn RuntimeOracle>) -> Self {
        Self::new(subject, HarnessConfig::default())
            .with_executor(Arc::new(OracleExecutor::new(oracle)))
            .with_environment(Arc::new(NoPreparation))
    }

    pub fn with_executor(mut self, executor: Arc<dyn ProbeExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_environment(mut self, environment: Arc<dyn EnvironmentPreparer>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Directives recorded so far (excluding the implicit subject require).
    pub fn directives(&self) -> &DirectiveList {
        &self.directives
    }

    /// Record that the runtime must be able to load `name`.
    pub fn add_require(&mut self, name: impl Into<String>) {
        self.directives.add_require(name);
    }

    /// Record that the constant `name` must resolve.
    pub fn add_constant(&mut self, name: impl Into<String>, location: impl Into<String>) {
        self.directives.add_constant(name, location);
    }

    /// Record that `receiver` must expose `method` as an instance method.
    ///
    /// With `allow_missing`, a receiver that overrides the missing-method hook
    /// passes silently when the method is absent.
    pub fn add_method(
        &mut self,
        receiver: impl Into<String>,
        method: impl Into<String>,
        location: impl Into<String>,
        allow_missing: bool,
    ) {
        self.directives
            .add_method(receiver, method, location, allow_missing, false);
    }

    /// Record that `receiver` must expose `method` as a singleton method.
    pub fn add_singleton_method(
        &mut self,
        receiver: impl Into<String>,
        method: impl Into<String>,
        location: impl Into<String>,
        allow_missing: bool,
    ) {
        self.directives
            .add_method(receiver, method, location, allow_missing, true);
    }

    /// Append an already-built directive.
    pub fn push(&mut self, directive: Directive) {
        self.directives.push(directive);
    }

    /// Run the session. Diagnostics of a failed probe go to the sink.
    ///
    /// The working directory is removed on every exit path, including errors
    /// and cancellation of the returned future.
    pub async fn run(&mut self) -> HarnessResult<ValidationReport> {
        if self.consumed {
            return Err(HarnessError::SessionConsumed {
                subject: self.subject.clone(),
            });
        }
        self.consumed = true;

        let span = info_span!("probe.session", subject = %self.subject);
        self.run_once().instrument(span).await
    }

    async fn run_once(&mut self) -> HarnessResult<ValidationReport> {
        let start = Instant::now();

        let mut directives = std::mem::take(&mut self.directives);
        directives.prepend_require(self.subject.clone());

        let workdir = WorkDir::create(&self.config, &self.subject)?;

        let readiness = self
            .environment
            .prepare(&self.subject, workdir.path())
            .await?;
        if let Readiness::Failed(diagnostics) = readiness {
            warn!("Environment preparation failed, skipping probe");
            for diagnostic in &diagnostics {
                self.sink.emit(diagnostic);
            }
            return Ok(ValidationReport {
                subject: self.subject.clone(),
                passed: false,
                diagnostics,
                environment_ready: false,
                probe_digest: None,
                exit_code: None,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        let probe = render_probe(&directives);
        info!(
            directives = directives.len(),
            digest = %probe.short_digest(),
            "Running probe"
        );

        let result = self.executor.execute(&probe, workdir.path()).await?;
        let classification = classify(&result);

        if classification.passed {
            info!("Probe passed");
        } else {
            warn!(
                exit_code = ?result.exit_code,
                diagnostics = classification.diagnostics.len(),
                "Probe failed"
            );
            for diagnostic in &classification.diagnostics {
                self.sink.emit(diagnostic);
            }
        }

        Ok(ValidationReport {
            subject: self.subject.clone(),
            passed: classification.passed,
            diagnostics: classification.diagnostics,
            environment_ready: true,
            probe_digest: Some(probe.digest()),
            exit_code: result.exit_code,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
