//! Surface Probe CLI
//!
//! The `surface-probe` command validates a declared interface surface against
//! a live runtime instance of the library.
//!
//! ## Commands
//!
//! - `validate`: Run a manifest's assertions and report what is missing
//! - `render`: Print the probe a manifest would run, without running it
//!
//! Exit codes: 0 when every check passed, 1 on validation failure, 2 when the
//! harness itself could not run (missing tools, timeouts, bad input).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use probe_harness::{
    render_probe, telemetry, AssertionManifest, BundlerEnvironment, EnvironmentPreparer,
    GemRequirement, HarnessConfig, HarnessError, NoPreparation, ValidationReport,
    ValidationSession,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};

#[derive(Parser)]
#[command(name = "surface-probe")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Validate declared constants and methods against a live runtime", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every assertion in a manifest against the subject library
    Validate {
        /// Assertion manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Override the manifest's subject name
        #[arg(long)]
        subject: Option<String>,

        /// Command that runs the probe; the probe file name is appended
        #[arg(long, env = "SURFACE_PROBE_ENTRY", default_value = "bundle exec ruby")]
        entry_command: String,

        /// Probe timeout in seconds (0 disables it)
        #[arg(long, env = "SURFACE_PROBE_TIMEOUT", default_value_t = 300)]
        timeout: u64,

        /// Parent directory for the scoped working directory
        #[arg(long)]
        work_root: Option<PathBuf>,

        /// Keep the working directory after the run
        #[arg(long)]
        keep_workdir: bool,

        /// Skip the Gemfile and `bundle install`; the environment must already be usable
        #[arg(long, conflicts_with_all = ["install_command", "subject_path", "subject_version", "gems"])]
        no_bundle: bool,

        /// Command that installs the generated Gemfile
        #[arg(long, env = "SURFACE_PROBE_INSTALL", default_value = "bundle install")]
        install_command: String,

        /// Use a local checkout of the subject gem
        #[arg(long)]
        subject_path: Option<PathBuf>,

        /// Version constraint for the subject gem
        #[arg(long)]
        subject_version: Option<String>,

        /// Additional gem to install alongside the subject (repeatable)
        #[arg(long = "gem")]
        gems: Vec<String>,

        /// Print the report as JSON on stdout
        #[arg(long)]
        report_json: bool,
    },

    /// Print the rendered probe for a manifest
    Render {
        /// Assertion manifest (JSON)
        #[arg(short, long)]
        manifest: PathBuf,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// JSON form of a validation report.
#[derive(Debug, Serialize)]
struct ReportView<'a> {
    subject: &'a str,
    passed: bool,
    environment_ready: bool,
    exit_code: Option<i32>,
    duration_ms: u64,
    probe_digest: Option<&'a str>,
    diagnostics: &'a [probe_harness::Diagnostic],
}

impl<'a> From<&'a ValidationReport> for ReportView<'a> {
    fn from(report: &'a ValidationReport) -> Self {
        Self {
            subject: &report.subject,
            passed: report.passed,
            environment_ready: report.environment_ready,
            exit_code: report.exit_code,
            duration_ms: report.duration_ms,
            probe_digest: report.probe_digest.as_deref(),
            diagnostics: &report.diagnostics,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    telemetry::init_tracing(cli.json, level);

    let outcome = match cli.command {
        Commands::Validate {
            manifest,
            subject,
            entry_command,
            timeout,
            work_root,
            keep_workdir,
            no_bundle,
            install_command,
            subject_path,
            subject_version,
            gems,
            report_json,
        } => {
            let mut config = HarnessConfig::default()
                .with_entry_command_line(&entry_command)
                .with_install_command_line(&install_command)
                .with_timeout_secs(timeout)
                .keep_workdir(keep_workdir);
            if let Some(root) = work_root {
                config = config.with_work_root(root);
            }
            let environment: Arc<dyn EnvironmentPreparer> = if no_bundle {
                Arc::new(NoPreparation)
            } else {
                Arc::new(bundler_environment(&config, subject_path, subject_version, &gems))
            };
            cmd_validate(&manifest, subject, config, environment, report_json).await
        }
        Commands::Render { manifest, output } => cmd_render(&manifest, output.as_deref()),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            match e.downcast_ref::<HarnessError>() {
                Some(harness) if harness.is_configuration() => {
                    error!("Configuration error: {:#}", e)
                }
                _ => error!("{:#}", e),
            }
            ExitCode::from(2)
        }
    }
}

fn bundler_environment(
    config: &HarnessConfig,
    subject_path: Option<PathBuf>,
    subject_version: Option<String>,
    gems: &[String],
) -> BundlerEnvironment {
    let mut env = BundlerEnvironment::new()
        .with_install_command(config.install_command.clone())
        .with_timeout_secs(config.timeout_secs);
    if let Some(path) = subject_path {
        env = env.with_subject_path(path);
    }
    if let Some(version) = subject_version {
        env = env.with_subject_version(version);
    }
    for gem in gems {
        env = env.with_gem(GemRequirement::named(gem.clone()));
    }
    env
}

async fn cmd_validate(
    manifest_path: &Path,
    subject: Option<String>,
    config: HarnessConfig,
    environment: Arc<dyn EnvironmentPreparer>,
    report_json: bool,
) -> Result<bool> {
    let manifest = AssertionManifest::load(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;
    let subject = subject.unwrap_or_else(|| manifest.subject.clone());

    let mut session = ValidationSession::new(subject.clone(), config).with_environment(environment);
    manifest.apply_to(&mut session);

    info!(subject = %subject, directives = manifest.directives.len(), "Validating");
    let report = session
        .run()
        .await
        .with_context(|| format!("Failed to validate {}", subject))?;

    if report_json {
        let json = serde_json::to_string_pretty(&ReportView::from(&report))?;
        println!("{}", json);
    }

    if report.passed {
        info!(subject = %subject, duration_ms = report.duration_ms, "All checks passed");
    } else if !report.environment_ready {
        error!(subject = %subject, "Environment preparation failed");
    } else {
        error!(
            subject = %subject,
            errors = report.error_count(),
            notes = report.note_count(),
            "Validation failed"
        );
    }

    Ok(report.passed)
}

fn cmd_render(manifest_path: &Path, output: Option<&Path>) -> Result<bool> {
    let manifest = AssertionManifest::load(manifest_path)
        .with_context(|| format!("Failed to load manifest {}", manifest_path.display()))?;

    // Same directive order a session would use.
    let mut directives = probe_harness::DirectiveList::new();
    directives.add_require(manifest.subject.clone());
    directives.extend(manifest.directives.iter().cloned());
    let probe = render_probe(&directives);

    match output {
        Some(path) => {
            std::fs::write(path, &probe.text)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), digest = %probe.short_digest(), "Probe written");
        }
        None => print!("{}", probe.text),
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "subject": "foo",
        "directives": [
            {"kind": "constant", "name": "Foo", "location": "foo.rbi:1"}
        ]
    }"#;

    #[test]
    fn test_cli_parses_validate() {
        let cli = Cli::try_parse_from([
            "surface-probe",
            "validate",
            "--manifest",
            "m.json",
            "--timeout",
            "5",
            "--gem",
            "minitest",
            "--gem",
            "rake",
        ])
        .unwrap();

        match cli.command {
            Commands::Validate { timeout, gems, .. } => {
                assert_eq!(timeout, 5);
                assert_eq!(gems, vec!["minitest", "rake"]);
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_render_writes_probe_with_subject_first() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.json");
        let output = dir.path().join("probe.rb");
        std::fs::write(&manifest, MANIFEST).unwrap();

        assert!(cmd_render(&manifest, Some(&output)).unwrap());

        let text = std::fs::read_to_string(&output).unwrap();
        assert!(text.find("require \"foo\"").unwrap() < text.find("\"Foo\", \"foo.rbi:1\"").unwrap());
    }

    #[test]
    fn test_bundler_environment_from_flags() {
        let env = bundler_environment(
            &HarnessConfig::default(),
            Some(PathBuf::from("/src/foo")),
            None,
            &["minitest".to_string()],
        );
        let gemfile = env.gemfile("foo");
        assert!(gemfile.contains("gem \"foo\", path: \"/src/foo\""));
        assert!(gemfile.contains("gem \"minitest\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validate_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.json");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let config = HarnessConfig::default()
            .with_entry_command_line("false")
            .with_work_root(dir.path().join("work"));

        let passed = cmd_validate(&manifest, None, config, Arc::new(NoPreparation), false)
            .await
            .unwrap();
        assert!(!passed);
    }

    #[test]
    fn test_bundling_is_on_by_default() {
        let cli = Cli::try_parse_from(["surface-probe", "validate", "--manifest", "m.json"]).unwrap();

        match cli.command {
            Commands::Validate {
                no_bundle,
                install_command,
                ..
            } => {
                assert!(!no_bundle);
                assert_eq!(install_command, "bundle install");
            }
            _ => panic!("expected validate"),
        }
    }

    #[test]
    fn test_no_bundle_rejects_gem_flags() {
        for flags in [
            &["--gem", "minitest"][..],
            &["--subject-version", "~> 1.0"][..],
            &["--subject-path", "/src/foo"][..],
            &["--install-command", "true"][..],
        ] {
            let mut args = vec!["surface-probe", "validate", "--manifest", "m.json", "--no-bundle"];
            args.extend_from_slice(flags);

            let err = Cli::try_parse_from(args).err().unwrap();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_validate_fails_when_install_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("m.json");
        std::fs::write(&manifest, MANIFEST).unwrap();

        let config = HarnessConfig::default()
            .with_entry_command_line("true")
            .with_install_command_line("false")
            .with_work_root(dir.path().join("work"));
        let environment = Arc::new(bundler_environment(&config, None, None, &[]));

        let passed = cmd_validate(&manifest, None, config, environment, false)
            .await
            .unwrap();
        assert!(!passed);
    }

    #[tokio::test]
    async fn test_validate_missing_manifest_is_error() {
        let err = cmd_validate(
            Path::new("/nonexistent/manifest.json"),
            None,
            HarnessConfig::default(),
            Arc::new(NoPreparation),
            false,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to load manifest"));
    }
}
