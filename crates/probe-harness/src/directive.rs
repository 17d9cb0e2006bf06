//! Assertion directives and the append-only accumulator that orders them.

use serde::{Deserialize, Serialize};

/// One unit of "require this" or "check this" recorded by a caller.
///
/// `location` strings are opaque: they are echoed in diagnostics and never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Directive {
    /// The runtime must be able to load a unit named `name`.
    Require { name: String },

    /// A named constant must resolve in the global namespace.
    Constant {
        name: String,
        location: String,
    },

    /// `receiver` must expose `method`, as an instance method or a singleton method.
    Method {
        receiver: String,
        method: String,
        location: String,
        #[serde(default)]
        singleton: bool,
        #[serde(default)]
        allow_missing: bool,
    },
}

impl Directive {
    /// Whether this directive belongs to the require phase of the probe.
    pub fn is_require(&self) -> bool {
        matches!(self, Directive::Require { .. })
    }
}

/// Ordered, append-only sequence of directives.
///
/// No validation happens at append time; malformed names only surface as
/// failures inside the probe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectiveList {
    items: Vec<Directive>,
}

impl DirectiveList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the runtime must be able to load `name`.
    pub fn add_require(&mut self, name: impl Into<String>) {
        self.items.push(Directive::Require { name: name.into() });
    }

    /// Record that the constant `name` must resolve.
    pub fn add_constant(&mut self, name: impl Into<String>, location: impl Into<String>) {
        self.items.push(Directive::Constant {
            name: name.into(),
            location: location.into(),
        });
    }

    /// Record that `receiver` must expose `method`.
    pub fn add_method(
        &mut self,
        receiver: impl Into<String>,
        method: impl Into<String>,
        location: impl Into<String>,
        allow_missing: bool,
        singleton: bool,
    ) {
        self.items.push(Directive::Method {
            receiver: receiver.into(),
            method: method.into(),
            location: location.into(),
            singleton,
            allow_missing,
        });
    }

    /// Insert a require ahead of every directive recorded so far.
    pub(crate) fn prepend_require(&mut self, name: impl Into<String>) {
        self.items.insert(0, Directive::Require { name: name.into() });
    }

    /// Append an already-built directive.
    pub fn push(&mut self, directive: Directive) {
        self.items.push(directive);
    }

    /// Require directives, in insertion order.
    pub fn requires(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|d| match d {
            Directive::Require { name } => Some(name.as_str()),
            _ => None,
        })
    }

    /// Constant and method checks, in insertion order.
    pub fn checks(&self) -> impl Iterator<Item = &Directive> {
        self.items.iter().filter(|d| !d.is_require())
    }

    /// All directives, in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Extend<Directive> for DirectiveList {
    fn extend<T: IntoIterator<Item = Directive>>(&mut self, iter: T) {
        self.items.extend(iter);
    }
}

impl<'a> IntoIterator for &'a DirectiveList {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
