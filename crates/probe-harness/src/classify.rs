//! Diagnostic classification of captured probe output.

use serde::{Deserialize, Serialize};

use crate::executor::ProbeResult;

/// Prefix marking an informational line.
pub const NOTE_PREFIX: &str = "Note: ";

/// Severity of a diagnostic line.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Note,
    Error,
}

/// One classified line of probe output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub text: String,
}

impl Diagnostic {
    pub fn note(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Note,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            text: text.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Classified output plus the overall verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub passed: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Split output into trimmed, non-empty lines (`\r\n` and `\r` normalized),
/// classifying `Note: ` lines as notes and everything else as errors.
pub fn classify_output(raw: &str) -> Vec<Diagnostic> {
    raw.replace("\r\n", "\n")
        .split(['\n', '\r'])
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            if line.starts_with(NOTE_PREFIX) {
                Diagnostic::note(line)
            } else {
                Diagnostic::error(line)
            }
        })
        .collect()
}

/// Verdict is decided by exit status alone; diagnostics are only produced for
/// failed runs.
pub fn classify(result: &ProbeResult) -> Classification {
    if result.exit_succeeded {
        return Classification {
            passed: true,
            diagnostics: Vec::new(),
        };
    }
    Classification {
        passed: false,
        diagnostics: classify_output(&result.raw_output),
    }
}
