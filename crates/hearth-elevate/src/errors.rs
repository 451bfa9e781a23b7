//! Error types for elevation and the worker channel.

use thiserror::Error;

/// Failures establishing or using the elevated worker channel.
///
/// Channel failures are scoped to the specific operation and its caller;
/// they never affect unrelated operations on a freshly established channel.
#[derive(Debug, Error)]
pub enum ElevationError {
    /// The user or the OS refused privilege escalation. Surfaced as a
    /// distinct, user-actionable error and never retried automatically.
    #[error("elevation denied: {reason}")]
    Denied {
        /// What refused the escalation (prompt dismissed, policy, ...).
        reason: String,
    },

    /// The worker did not connect back within the bounded wait.
    #[error("worker did not connect within {waited_ms}ms")]
    ConnectTimeout {
        /// How long the bridge waited.
        waited_ms: u64,
    },

    /// The channel closed with this request outstanding (queued or in
    /// flight).
    #[error("elevated worker terminated with requests outstanding")]
    WorkerTerminated,

    /// The worker's compiled dispatch table has no such operation — a
    /// host-side defect, always reported, never silently swallowed.
    #[error("worker does not implement operation '{operation}'")]
    UnknownOperation {
        /// The unimplemented operation name.
        operation: String,
    },

    /// The worker rejected the request frame itself as malformed.
    #[error("worker rejected request: {message}")]
    BadRequest {
        /// Worker-reported reason.
        message: String,
    },

    /// The privileged operation failed for domain reasons; the message is
    /// carried back verbatim.
    #[error("elevated operation failed: {0}")]
    Operation(String),

    /// Transport-level failure on the channel.
    #[error("elevation channel io error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer violated the wire protocol (bad handshake, unexpected
    /// frame shape).
    #[error("elevation protocol violation: {message}")]
    Protocol {
        /// What was violated.
        message: String,
    },
}

impl ElevationError {
    /// Whether retrying the whole elevation is plausible: technical faults
    /// may clear on retry, a user refusal will not.
    pub fn retry_plausible(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. } | Self::WorkerTerminated | Self::Io(_)
        )
    }
}
