//! Tagged actions dispatched against the composed state tree.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::paths::StatePath;

/// The tag naming a state transition (e.g. `mods/enable`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTag(String);

impl ActionTag {
    /// Create an action tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ActionTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A state-transition request.
///
/// An untargeted action is offered to every mounted reducer that declares a
/// handler for its tag; a targeted action only runs handlers mounted at the
/// target path.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    /// Transition tag.
    pub tag: ActionTag,
    /// Handler input, opaque to the host.
    pub payload: Value,
    /// Optional explicit mount target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<StatePath>,
}

impl Action {
    /// Build an untargeted action.
    pub fn new(tag: impl Into<ActionTag>, payload: Value) -> Self {
        Self {
            tag: tag.into(),
            payload,
            target: None,
        }
    }

    /// Restrict the action to reducers mounted at `target`.
    pub fn targeted(mut self, target: StatePath) -> Self {
        self.target = Some(target);
        self
    }
}

impl From<String> for ActionTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}
