//! End-to-end checks against a real Ruby interpreter.
//!
//! Each test writes a small library into a temp dir, puts it on Ruby's load
//! path and runs a session against it with `ruby` as the entry command. Tests
//! return early when `ruby` is not on PATH.

use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::Arc;

use probe_harness::{
    Diagnostic, HarnessConfig, MemorySink, NoPreparation, ValidationReport, ValidationSession,
};
use tempfile::tempdir;

const SUBJECT: &str = "inventory";

const LIBRARY: &str = r#"
module Inventory
  VERSION = "1.0"
  autoload :Broken, "/nonexistent/inventory/broken"
end

class Widget
  def self.build
    new
  end

  def name
    "widget"
  end
end

class Proxy
  def method_missing(name, *args)
    super
  end

  def respond_to_missing?(name, include_private = false)
    super
  end
end

class Tricky
  def self.instance_method(name)
    raise ArgumentError, "introspection refused" if name == :method_missing

    super
  end
end
"#;

fn is_ruby_available() -> bool {
    Command::new("ruby")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Session over the `inventory` library written under `root/lib`.
fn session(root: &Path, sink: Arc<MemorySink>) -> ValidationSession {
    let lib = root.join("lib");
    std::fs::create_dir_all(&lib).unwrap();
    std::fs::write(lib.join(format!("{SUBJECT}.rb")), LIBRARY).unwrap();

    let config = HarnessConfig {
        entry_command: vec![
            "ruby".to_string(),
            "-W0".to_string(),
            "-I".to_string(),
            lib.to_string_lossy().into_owned(),
        ],
        timeout_secs: 60,
        work_root: Some(root.join("work")),
        ..HarnessConfig::default()
    };

    ValidationSession::new(SUBJECT, config)
        .with_environment(Arc::new(NoPreparation))
        .with_sink(sink)
}

fn assert_failed_with(report: &ValidationReport, sink: &MemorySink, expected: Vec<Diagnostic>) {
    assert!(!report.passed);
    assert_eq!(report.exit_code, Some(1));
    assert_eq!(report.diagnostics, expected);
    assert_eq!(sink.lines(), expected);
}

macro_rules! require_ruby {
    () => {
        if !is_ruby_available() {
            eprintln!("ruby not on PATH, skipping");
            return;
        }
    };
}

#[tokio::test]
async fn test_present_surface_passes() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_constant("Inventory", "inventory.rbi:1");
    session.add_constant("Inventory::VERSION", "inventory.rbi:2");
    session.add_method("Widget", "name", "widget.rbi:3", false);
    session.add_singleton_method("Widget", "build", "widget.rbi:2", false);

    let report = session.run().await.unwrap();
    assert!(report.passed, "diagnostics: {:?}", report.diagnostics);
    assert_eq!(report.exit_code, Some(0));
    assert!(report.diagnostics.is_empty());
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn test_missing_constant_message() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_constant("Inventory::Missing", "inventory.rbi:4");

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![Diagnostic::error(
            "Missing runtime constant Inventory::Missing (defined at inventory.rbi:4)",
        )],
    );
}

#[tokio::test]
async fn test_missing_instance_and_singleton_methods_use_their_separators() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_method("Widget", "color", "widget.rbi:5", false);
    session.add_singleton_method("Widget", "create", "widget.rbi:6", false);

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![
            Diagnostic::error("Missing runtime method Widget#color (defined at widget.rbi:5)"),
            Diagnostic::error("Missing runtime method Widget.create (defined at widget.rbi:6)"),
        ],
    );
}

#[tokio::test]
async fn test_method_on_missing_receiver_reports_constant_only() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_method("Ghost", "haunt", "ghost.rbi:1", false);

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![Diagnostic::error(
            "Missing runtime constant Ghost (defined at ghost.rbi:1)",
        )],
    );
}

#[tokio::test]
async fn test_annotated_dynamic_dispatch_passes_silently() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_method("Proxy", "forward", "proxy.rbi:2", true);

    let report = session.run().await.unwrap();
    assert!(report.passed, "diagnostics: {:?}", report.diagnostics);
    assert!(sink.lines().is_empty());
}

#[tokio::test]
async fn test_unannotated_dynamic_dispatch_reports_error_then_note() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_method("Proxy", "forward", "proxy.rbi:2", false);

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![
            Diagnostic::error("Missing runtime method Proxy#forward (defined at proxy.rbi:2)"),
            Diagnostic::note(
                "Note: forward could be delegated via dynamic dispatch but is not annotated to allow it.",
            ),
        ],
    );
    assert_eq!(report.error_count(), 1);
    assert_eq!(report.note_count(), 1);
}

#[tokio::test]
async fn test_unanswerable_dispatch_question_fails_closed() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_method("Tricky", "anything", "tricky.rbi:1", true);

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![Diagnostic::error(
            "Missing runtime method Tricky#anything (defined at tricky.rbi:1)",
        )],
    );
}

#[tokio::test]
async fn test_failed_require_skips_checks() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_require("no_such_library_xyz");
    session.add_constant("Inventory::Missing", "inventory.rbi:4");

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![Diagnostic::error("Can't require no_such_library_xyz")],
    );
}

#[tokio::test]
async fn test_every_require_attempted_in_order() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_require("no_such_library_one");
    session.add_require("json");
    session.add_require("no_such_library_two");

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![
            Diagnostic::error("Can't require no_such_library_one"),
            Diagnostic::error("Can't require no_such_library_two"),
        ],
    );
}

#[tokio::test]
async fn test_missing_subject_library_is_reported() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let config = HarnessConfig {
        entry_command: vec!["ruby".to_string(), "-W0".to_string()],
        timeout_secs: 60,
        work_root: Some(dir.path().join("work")),
        ..HarnessConfig::default()
    };
    let mut session = ValidationSession::new("no_such_subject_xyz", config)
        .with_environment(Arc::new(NoPreparation))
        .with_sink(sink.clone());

    session.add_constant("Anything", "anything.rbi:1");

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![Diagnostic::error("Can't require no_such_subject_xyz")],
    );
}

#[tokio::test]
async fn test_broken_autoload_is_missing_constant_and_checking_continues() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink.clone());

    session.add_constant("Inventory::Broken", "inventory.rbi:7");
    session.add_method("Widget", "color", "widget.rbi:5", false);

    let report = session.run().await.unwrap();
    assert_failed_with(
        &report,
        &sink,
        vec![
            Diagnostic::error("Missing runtime constant Inventory::Broken (defined at inventory.rbi:7)"),
            Diagnostic::error("Missing runtime method Widget#color (defined at widget.rbi:5)"),
        ],
    );
}

#[tokio::test]
async fn test_work_dir_removed_after_real_run() {
    require_ruby!();
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let mut session = session(dir.path(), sink);

    session.add_constant("Inventory::Missing", "inventory.rbi:4");
    session.run().await.unwrap();

    let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("work"))
        .map(|entries| entries.collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty());
}
