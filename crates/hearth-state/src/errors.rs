//! Error types for state composition and dispatch.

use hearth_core::{ActionTag, ExtensionName, StatePath};
use thiserror::Error;

/// Errors from composing reducer mounts or dispatching actions.
#[derive(Debug, Error)]
pub enum StateError {
    /// Two extensions claim overlapping state paths. Fatal to startup:
    /// a partially composed tree has no safe semantics.
    #[error(
        "state path conflict: '{first_owner}' at [{first_path}] overlaps '{second_owner}' at [{second_path}]"
    )]
    RegistrationConflict {
        /// Owner of the first conflicting mount.
        first_owner: ExtensionName,
        /// Path of the first conflicting mount.
        first_path: StatePath,
        /// Owner of the second conflicting mount.
        second_owner: ExtensionName,
        /// Path of the second conflicting mount.
        second_path: StatePath,
    },

    /// A transition handler returned an error; the dispatch was rejected
    /// atomically and the previous tree retained.
    #[error("handler of '{owner}' failed on action '{tag}': {message}")]
    HandlerFailed {
        /// Extension owning the failing handler.
        owner: ExtensionName,
        /// Action tag being dispatched.
        tag: ActionTag,
        /// Handler-reported failure.
        message: String,
    },

    /// A targeted dispatch named a path with no reducer mounted.
    #[error("no reducer mounted at [{path}]")]
    UnknownPath {
        /// The unmatched target path.
        path: StatePath,
    },
}
