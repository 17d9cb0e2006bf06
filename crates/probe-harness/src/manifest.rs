//! JSON assertion manifests.
//!
//! A manifest lets a caller hand the harness a file instead of calling the
//! session's `add_*` methods one by one:
//!
//! ```json
//! {
//!   "subject": "rake",
//!   "directives": [
//!     { "kind": "require", "name": "rake/tasklib" },
//!     { "kind": "constant", "name": "Rake::TaskLib", "location": "rake.rbi:12" },
//!     { "kind": "method", "receiver": "Rake::Task", "method": "invoke",
//!       "location": "rake.rbi:40", "allow_missing": false }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::directive::DirectiveList;
use crate::error::HarnessResult;
use crate::session::ValidationSession;

/// Subject name plus the directives to check against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionManifest {
    pub subject: String,

    #[serde(default)]
    pub directives: DirectiveList,
}

impl AssertionManifest {
    pub fn from_json(json: &str) -> HarnessResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> HarnessResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Replay every directive onto `session`, preserving order.
    pub fn apply_to(&self, session: &mut ValidationSession) {
        for directive in &self.directives {
            session.push(directive.clone());
        }
    }
}
