//! Harness configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default entry command; the probe file name is appended as the last argument.
pub const DEFAULT_ENTRY_COMMAND: &[&str] = &["bundle", "exec", "ruby"];

/// Default command that installs the generated Gemfile.
pub const DEFAULT_INSTALL_COMMAND: &[&str] = &["bundle", "install"];

/// Default probe timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration shared by every session a caller starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarnessConfig {
    /// Command used to run the probe (first element is the executable).
    pub entry_command: Vec<String>,

    /// Command that installs the generated Gemfile before the probe runs.
    pub install_command: Vec<String>,

    /// Timeout in seconds (0 = no timeout), applied to install and probe alike.
    pub timeout_secs: u64,

    /// Parent directory for scoped work directories (system temp when unset).
    pub work_root: Option<PathBuf>,

    /// Keep the work directory after the run instead of deleting it.
    pub keep_workdir: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            entry_command: DEFAULT_ENTRY_COMMAND.iter().map(|s| s.to_string()).collect(),
            install_command: DEFAULT_INSTALL_COMMAND
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            work_root: None,
            keep_workdir: false,
        }
    }
}

impl HarnessConfig {
    /// Replace the entry command with a whitespace-separated command line.
    pub fn with_entry_command_line(mut self, line: &str) -> Self {
        self.entry_command = line.split_whitespace().map(str::to_string).collect();
        self
    }

    /// Replace the install command with a whitespace-separated command line.
    pub fn with_install_command_line(mut self, line: &str) -> Self {
        self.install_command = line.split_whitespace().map(str::to_string).collect();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_work_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.work_root = Some(root.into());
        self
    }

    pub fn keep_workdir(mut self, keep: bool) -> Self {
        self.keep_workdir = keep;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.entry_command, vec!["bundle", "exec", "ruby"]);
        assert_eq!(config.install_command, vec!["bundle", "install"]);
        assert_eq!(config.timeout_secs, 300);
        assert!(config.work_root.is_none());
        assert!(!config.keep_workdir);
    }

    #[test]
    fn test_entry_command_line_split() {
        let config = HarnessConfig::default().with_entry_command_line("  ruby   -W0 ");
        assert_eq!(config.entry_command, vec!["ruby", "-W0"]);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: HarnessConfig = serde_json::from_str(r#"{"timeout_secs": 5}"#).unwrap();
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.entry_command, vec!["bundle", "exec", "ruby"]);
    }
}
