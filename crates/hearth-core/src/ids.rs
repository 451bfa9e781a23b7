//! Branded identifier for extensions.
//!
//! Every registration, failure report, and dependency edge is keyed by
//! [`ExtensionName`]. The newtype keeps extension identities from being
//! confused with arbitrary strings at API boundaries.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The declared identity of an extension.
///
/// Comes from the `name` field of the extension's manifest. Ordered and
/// hashable so it can key deterministic maps.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtensionName(String);

impl ExtensionName {
    /// Create an extension name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExtensionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExtensionName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ExtensionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}
