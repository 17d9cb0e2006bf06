//! Probe Harness - runtime validation of declared interface surfaces
//!
//! Checks that constants and methods declared for a library actually exist in
//! a live runtime instance of it:
//! - Accumulates require/constant/method directives in call order
//! - Renders them into a self-contained Ruby probe
//! - Runs the probe in a scoped working directory
//! - Classifies its output into notes, errors and a pass/fail verdict

pub mod classify;
pub mod config;
pub mod directive;
pub mod environment;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod oracle;
pub mod render;
pub mod session;
pub mod sink;
pub mod telemetry;

// Re-export key types
pub use classify::{classify_output, Diagnostic, Severity};
pub use config::HarnessConfig;
pub use directive::{Directive, DirectiveList};
pub use environment::{
    BundlerEnvironment, EnvironmentPreparer, GemRequirement, NoPreparation, Readiness,
};
pub use error::{HarnessError, HarnessResult};
pub use executor::{OracleExecutor, ProbeExecutor, ProbeResult, SubprocessExecutor, PROBE_FILE_NAME};
pub use manifest::AssertionManifest;
pub use oracle::{evaluate_probe, Fallback, RuntimeOracle, StubRuntime};
pub use render::{render_probe, Probe};
pub use session::{ValidationReport, ValidationSession};
pub use sink::{DiagnosticSink, MemorySink, TracingSink};
