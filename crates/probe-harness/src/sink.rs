//! Destinations for classified diagnostics.

use std::sync::Mutex;
use tracing::{error, info};

use crate::classify::{Diagnostic, Severity};

/// Receives diagnostics from a failed run.
pub trait DiagnosticSink: Send + Sync {
    /// Informational line.
    fn log(&self, text: &str);

    /// Hard error line.
    fn error(&self, text: &str);

    /// Route a diagnostic by severity.
    fn emit(&self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Note => self.log(&diagnostic.text),
            Severity::Error => self.error(&diagnostic.text),
        }
    }
}

/// Emits notes at `info` and errors at `error` through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn log(&self, text: &str) {
        info!(target: "surface_probe::diagnostic", "{text}");
    }

    fn error(&self, text: &str) {
        error!(target: "surface_probe::diagnostic", "{text}");
    }
}

/// Records every line it receives, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<Diagnostic>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn lines(&self) -> Vec<Diagnostic> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    fn push(&self, diagnostic: Diagnostic) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(diagnostic);
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn log(&self, text: &str) {
        self.push(Diagnostic::note(text));
    }

    fn error(&self, text: &str) {
        self.push(Diagnostic::error(text));
    }
}
