//! Runtime reflection as an injectable capability.
//!
//! The real probe asks a live Ruby VM whether constants and methods exist.
//! [`RuntimeOracle`] abstracts those questions so the probe semantics can be
//! replayed in-process by [`evaluate_probe`], producing exactly the output and
//! exit status the rendered script would.

use std::collections::{HashMap, HashSet};

use crate::directive::{Directive, DirectiveList};
use crate::executor::ProbeResult;
use crate::render::require_failure_line;

/// Internal failure while introspecting a receiver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("introspection fault: {0}")]
pub struct IntrospectionFault(pub String);

/// Introspection facilities of a subject runtime.
pub trait RuntimeOracle: Send + Sync {
    /// Whether the unit `name` can be loaded.
    fn load(&self, name: &str) -> bool;

    /// Whether `name` resolves in the global namespace.
    fn resolve_constant(&self, name: &str) -> bool;

    /// Whether `receiver` exposes `method` (singleton or instance).
    fn resolve_method(&self, receiver: &str, method: &str, singleton: bool) -> bool;

    /// Whether `receiver` overrides the generic missing-method hook below the
    /// root of the type hierarchy.
    fn supports_dispatch_fallback(&self, receiver: &str) -> Result<bool, IntrospectionFault>;
}

/// Success flag plus collected output, threaded through the check routines.
#[derive(Debug)]
pub struct ProbeState {
    success: bool,
    output: Vec<String>,
}

impl Default for ProbeState {
    fn default() -> Self {
        Self {
            success: true,
            output: Vec::new(),
        }
    }
}

impl ProbeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    fn fail(&mut self, line: String) {
        self.output.push(line);
        self.success = false;
    }

    fn note(&mut self, line: String) {
        self.output.push(line);
    }

    fn finish(self) -> ProbeResult {
        let mut raw_output = self.output.join("\n");
        if !raw_output.is_empty() {
            raw_output.push('\n');
        }
        ProbeResult {
            exit_succeeded: self.success,
            exit_code: Some(if self.success { 0 } else { 1 }),
            raw_output,
        }
    }
}

/// Check that `name` resolves; returns whether it did.
pub fn check_constant(
    state: &mut ProbeState,
    oracle: &dyn RuntimeOracle,
    name: &str,
    location: &str,
) -> bool {
    if oracle.resolve_constant(name) {
        return true;
    }
    state.fail(format!(
        "Missing runtime constant {name} (defined at {location})"
    ));
    false
}

/// Check that `receiver` exposes `method`, honouring the dispatch-fallback escape.
pub fn check_method(
    state: &mut ProbeState,
    oracle: &dyn RuntimeOracle,
    receiver: &str,
    method: &str,
    location: &str,
    singleton: bool,
    allow_missing: bool,
) {
    if !check_constant(state, oracle, receiver, location) {
        return;
    }
    if oracle.resolve_method(receiver, method, singleton) {
        return;
    }

    // Introspection faults count as "no fallback".
    let fallback = !singleton
        && oracle
            .supports_dispatch_fallback(receiver)
            .unwrap_or(false);
    if fallback && allow_missing {
        return;
    }

    let separator = if singleton { '.' } else { '#' };
    state.fail(format!(
        "Missing runtime method {receiver}{separator}{method} (defined at {location})"
    ));
    if fallback {
        state.note(format!(
            "Note: {method} could be delegated via dynamic dispatch but is not annotated to allow it."
        ));
    }
}

/// Replay a probe against `oracle`.
///
/// Every require is attempted; if any failed, evaluation stops before the
/// checks. Otherwise every check runs, regardless of earlier failures.
pub fn evaluate_probe(directives: &DirectiveList, oracle: &dyn RuntimeOracle) -> ProbeResult {
    let mut state = ProbeState::new();

    for name in directives.requires() {
        if !oracle.load(name) {
            state.fail(require_failure_line(name));
        }
    }
    if !state.is_success() {
        return state.finish();
    }

    for directive in directives.checks() {
        match directive {
            Directive::Require { .. } => {}
            Directive::Constant { name, location } => {
                check_constant(&mut state, oracle, name, location);
            }
            Directive::Method {
                receiver,
                method,
                location,
                singleton,
                allow_missing,
            } => check_method(
                &mut state,
                oracle,
                receiver,
                method,
                location,
                *singleton,
                *allow_missing,
            ),
        }
    }

    state.finish()
}

/// How a stub receiver answers the dispatch-fallback question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Fallback {
    /// Inherits the root default hook.
    #[default]
    Absent,
    /// Overrides the hook.
    Present,
    /// Introspection raises.
    Faulty,
}

#[derive(Debug, Clone, Default)]
struct StubReceiver {
    instance_methods: HashSet<String>,
    singleton_methods: HashSet<String>,
    fallback: Fallback,
}

/// In-memory runtime for tests and dry runs.
///
/// Receivers registered through the method builders also resolve as constants.
#[derive(Debug, Clone, Default)]
pub struct StubRuntime {
    loadable: HashSet<String>,
    constants: HashSet<String>,
    receivers: HashMap<String, StubReceiver>,
}

impl StubRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loadable(mut self, name: impl Into<String>) -> Self {
        self.loadable.insert(name.into());
        self
    }

    pub fn with_constant(mut self, name: impl Into<String>) -> Self {
        self.constants.insert(name.into());
        self
    }

    pub fn with_instance_method(mut self, receiver: &str, method: impl Into<String>) -> Self {
        self.receiver_mut(receiver)
            .instance_methods
            .insert(method.into());
        self
    }

    pub fn with_singleton_method(mut self, receiver: &str, method: impl Into<String>) -> Self {
        self.receiver_mut(receiver)
            .singleton_methods
            .insert(method.into());
        self
    }

    pub fn with_fallback(mut self, receiver: &str, fallback: Fallback) -> Self {
        self.receiver_mut(receiver).fallback = fallback;
        self
    }

    fn receiver_mut(&mut self, receiver: &str) -> &mut StubReceiver {
        self.constants.insert(receiver.to_string());
        self.receivers.entry(receiver.to_string()).or_default()
    }
}

impl RuntimeOracle for StubRuntime {
    fn load(&self, name: &str) -> bool {
        self.loadable.contains(name)
    }

    fn resolve_constant(&self, name: &str) -> bool {
        self.constants.contains(name)
    }

    fn resolve_method(&self, receiver: &str, method: &str, singleton: bool) -> bool {
        self.receivers.get(receiver).is_some_and(|r| {
            if singleton {
                r.singleton_methods.contains(method)
            } else {
                r.instance_methods.contains(method)
            }
        })
    }

    fn supports_dispatch_fallback(&self, receiver: &str) -> Result<bool, IntrospectionFault> {
        match self.receivers.get(receiver).map(|r| r.fallback) {
            Some(Fallback::Present) => Ok(true),
            Some(Fallback::Faulty) => Err(IntrospectionFault(format!(
                "{receiver}.instance_method(:method_missing) raised"
            ))),
            Some(Fallback::Absent) | None => Ok(false),
        }
    }
}
