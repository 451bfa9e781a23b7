//! Deferred "once ready" callback runner.
//!
//! After all extensions have loaded and the state tree is composed, the
//! host drains the deferred registrations and runs them. The synchronous
//! part of each callback is invoked sequentially in registration order;
//! the returned futures are spawned as independent units of concurrent
//! work, so a callback that never completes cannot block the others.
//! Failures (including panics) are isolated per callback and collected.

use std::sync::Arc;
use std::time::Duration;

use hearth_core::ExtensionName;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::registry::{CapabilityHandle, CapabilityRegistry};

/// How one deferred callback ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyResult {
    /// The callback completed successfully.
    Completed,
    /// The callback returned an error or panicked.
    Failed(String),
    /// The callback had not completed within the grace period; it is left
    /// running and not awaited further.
    StillRunning,
}

/// Outcome of one extension's deferred callback.
#[derive(Debug, Clone)]
pub struct ReadyOutcome {
    /// Extension that registered the callback.
    pub name: ExtensionName,
    /// How the callback ended.
    pub result: ReadyResult,
}

/// Drain and run every deferred callback registered with `registry`.
///
/// `grace` bounds how long the runner waits for the whole batch; callbacks
/// still pending at the deadline are reported as [`ReadyResult::StillRunning`]
/// and left to finish (or not) on their own.
pub async fn run_ready_callbacks(
    registry: &Arc<CapabilityRegistry>,
    grace: Duration,
) -> Vec<ReadyOutcome> {
    let deferred = registry.take_deferred();
    if deferred.is_empty() {
        return Vec::new();
    }
    debug!(count = deferred.len(), "running deferred ready callbacks");

    // Invoke synchronously in registration order; spawn each future as its
    // own task so one stalled callback cannot starve the rest.
    let mut running = Vec::with_capacity(deferred.len());
    for (name, callback) in deferred {
        let handle = CapabilityHandle::new(Arc::clone(registry));
        let future = callback(handle);
        running.push((name, tokio::spawn(future)));
    }

    let deadline = Instant::now() + grace;
    let mut outcomes = Vec::with_capacity(running.len());
    for (name, join) in running {
        let result = match timeout_at(deadline, join).await {
            Ok(Ok(Ok(()))) => ReadyResult::Completed,
            Ok(Ok(Err(message))) => {
                warn!(extension = %name, error = %message, "deferred callback failed");
                ReadyResult::Failed(message)
            }
            Ok(Err(join_error)) => {
                let message = if join_error.is_panic() {
                    "deferred callback panicked".to_string()
                } else {
                    join_error.to_string()
                };
                warn!(extension = %name, error = %message, "deferred callback aborted");
                ReadyResult::Failed(message)
            }
            Err(_) => {
                warn!(extension = %name, "deferred callback still running after grace period");
                ReadyResult::StillRunning
            }
        };
        outcomes.push(ReadyOutcome { name, result });
    }
    outcomes
}
