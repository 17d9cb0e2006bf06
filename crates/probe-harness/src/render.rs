//! Probe rendering: directives in, one self-contained Ruby script out.
//!
//! The generated script threads an explicit `SurfaceProbeState` object through
//! its checking routines instead of relying on a global flag. Diagnostics are
//! written to stderr, with stdout reopened onto stderr so the harness sees one
//! ordered stream.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

use crate::directive::{Directive, DirectiveList};

/// Fixed checking prelude embedded at the top of every probe.
const PRELUDE: &str = r##"# frozen_string_literal: true

STDOUT.reopen(STDERR)
STDERR.sync = true

class SurfaceProbeState
  def initialize
    @success = true
  end

  def fail!
    @success = false
  end

  def success?
    @success
  end
end

def __probe_get_const(state, const_name, loc)
  Kernel.const_get(const_name)
rescue NameError, LoadError
  $stderr.puts("Missing runtime constant #{const_name} (defined at #{loc})")
  state.fail!
  nil
end

def __probe_dispatch_fallback?(const)
  const.instance_method(:method_missing).owner != BasicObject
rescue StandardError
  false
end

def __probe_get_method(state, recv_name, method_name, loc, singleton:, allow_missing:)
  const = __probe_get_const(state, recv_name, loc)
  return unless const

  if singleton
    const.method(method_name)
  else
    const.instance_method(method_name)
  end
rescue NameError
  separator = singleton ? "." : "#"
  fallback = !singleton && __probe_dispatch_fallback?(const)
  return if fallback && allow_missing

  $stderr.puts("Missing runtime method #{recv_name}#{separator}#{method_name} (defined at #{loc})")
  if fallback
    $stderr.puts("Note: #{method_name} could be delegated via dynamic dispatch but is not annotated to allow it.")
  end
  state.fail!
  nil
end

state = SurfaceProbeState.new
"##;

/// A rendered probe: the script text plus the directives it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Probe {
    /// Executable script text.
    pub text: String,

    /// Directives the script embodies, in emission order.
    pub directives: DirectiveList,
}

impl Probe {
    /// SHA-256 hex digest of the script text.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// First 12 characters of the digest, for log lines.
    pub fn short_digest(&self) -> String {
        let digest = self.digest();
        digest[..12].to_string()
    }
}

/// Render directives into a probe.
///
/// Pure and deterministic: the same list always yields the same text. Requires
/// are emitted first (each one guarded so a failed load does not abort the
/// others), then an early exit if any require failed, then every check in
/// insertion order, then the final exit.
pub fn render_probe(directives: &DirectiveList) -> Probe {
    let mut text = String::from(PRELUDE);

    for name in directives.requires() {
        render_require(&mut text, name);
    }

    text.push_str("\nexit(1) unless state.success?\n\n");

    for directive in directives.checks() {
        render_check(&mut text, directive);
    }

    text.push_str("\nexit(1) unless state.success?\n");

    Probe {
        text,
        directives: directives.clone(),
    }
}

/// Notice printed when a require fails.
pub(crate) fn require_failure_line(name: &str) -> String {
    format!("Can't require {name}")
}

fn render_require(out: &mut String, name: &str) {
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "begin\n  require {}\nrescue ScriptError, StandardError\n  $stderr.puts({})\n  state.fail!\nend\n",
        ruby_str(name),
        ruby_str(&require_failure_line(name)),
    );
}

fn render_check(out: &mut String, directive: &Directive) {
    match directive {
        Directive::Require { .. } => {}
        Directive::Constant { name, location } => {
            let _ = writeln!(
                out,
                "__probe_get_const(state, {}, {})",
                ruby_str(name),
                ruby_str(location),
            );
        }
        Directive::Method {
            receiver,
            method,
            location,
            singleton,
            allow_missing,
        } => {
            let _ = writeln!(
                out,
                "__probe_get_method(state, {}, {}, {}, singleton: {}, allow_missing: {})",
                ruby_str(receiver),
                ruby_str(method),
                ruby_str(location),
                singleton,
                allow_missing,
            );
        }
    }
}

/// Quote `value` as a Ruby double-quoted string literal.
///
/// `#` is escaped so caller-supplied names can never open an interpolation.
pub fn ruby_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '#' => out.push_str("\\#"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
