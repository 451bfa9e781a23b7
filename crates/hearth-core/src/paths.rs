//! Paths addressing subtrees of the composed state tree.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A sequence of string segments identifying where in the global state tree
/// a reducer's output is written.
///
/// Two paths conflict when they are equal or one is a prefix of the other;
/// composition rejects conflicting reducer mounts before any dispatch runs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatePath(Vec<String>);

impl StatePath {
    /// Build a path from segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// The path's segments in order.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments (the tree root).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `self` is a strict prefix of `other`.
    pub fn is_prefix_of(&self, other: &StatePath) -> bool {
        self.0.len() < other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Whether two paths claim overlapping subtrees: equal, or either a
    /// prefix of the other.
    pub fn overlaps(&self, other: &StatePath) -> bool {
        self == other || self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl<S: Into<String>> FromIterator<S> for StatePath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
