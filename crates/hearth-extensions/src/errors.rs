//! Error types for the extension load lifecycle.

use hearth_core::ExtensionName;
use thiserror::Error;

/// Per-extension failures during loading and registration.
///
/// These are isolated and collected — one extension's failure never aborts
/// the host's startup.
#[derive(Debug, Error)]
pub enum ExtensionError {
    /// The extension was already driven through its load lifecycle.
    /// Re-loading after a prior failure is disallowed to avoid partial
    /// re-registration.
    #[error("extension '{name}' was already loaded this process")]
    AlreadyLoaded {
        /// Extension that was loaded before.
        name: ExtensionName,
    },

    /// The descriptor's entry key is not registered with the host.
    #[error("no module registered for entry '{entry}'")]
    ModuleNotRegistered {
        /// The unresolved entry key.
        entry: String,
    },

    /// The module exposes none of the recognized entry shapes
    /// (bare, default, main).
    #[error("module '{entry}' exposes no recognized entry point")]
    NoRecognizedEntry {
        /// The module's entry key.
        entry: String,
    },

    /// A declared dependency is not ready, so this extension may not
    /// initialize.
    #[error("extension '{name}' is blocked: dependency '{dependency}' is not ready")]
    DependencyNotReady {
        /// The blocked extension.
        name: ExtensionName,
        /// The dependency that is present but not ready.
        dependency: ExtensionName,
    },

    /// The entry point returned `false` or an error during its synchronous
    /// registration phase.
    #[error("entry point of '{name}' failed: {message}")]
    EntryFailed {
        /// The failing extension.
        name: ExtensionName,
        /// Entry-reported failure.
        message: String,
    },
}
