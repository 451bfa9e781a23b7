//! The host startup routine.
//!
//! Discover → resolve → load in resolved order → compose the state tree →
//! run deferred ready callbacks. Per-extension failures are isolated and
//! collected into a [`StartupReport`]; the host runs with reduced
//! functionality rather than aborting. The one fatal startup failure is a
//! state-path conflict, because a partially composed tree has no safe
//! semantics.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hearth_core::ExtensionName;
use hearth_extensions::entry::EntryProvider;
use hearth_extensions::loader::{Loader, discover};
use hearth_extensions::ready::{ReadyResult, run_ready_callbacks};
use hearth_extensions::registry::CapabilityRegistry;
use hearth_extensions::resolver::resolve;
use hearth_state::{StateError, StateTree, compose};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::HostConfig;

/// Which startup phase a problem was recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemPhase {
    /// Scanning the extension roots.
    Discovery,
    /// Dependency resolution.
    Resolution,
    /// Loading and registration.
    Load,
    /// Deferred ready callbacks.
    Ready,
}

impl fmt::Display for ProblemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Discovery => "discovery",
            Self::Resolution => "resolution",
            Self::Load => "load",
            Self::Ready => "ready",
        };
        f.write_str(label)
    }
}

/// One named, skippable problem from startup.
#[derive(Debug, Clone)]
pub struct Problem {
    /// The affected extension, when attributable.
    pub extension: Option<ExtensionName>,
    /// Startup phase.
    pub phase: ProblemPhase,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.extension {
            Some(name) => write!(f, "[{}] {}: {}", self.phase, name, self.message),
            None => write!(f, "[{}] {}", self.phase, self.message),
        }
    }
}

/// What happened during startup.
#[derive(Debug)]
pub struct StartupReport {
    /// When the startup routine began.
    pub started_at: DateTime<Utc>,
    /// Extensions that completed registration, in load order.
    pub loaded: Vec<ExtensionName>,
    /// Collected per-extension problems.
    pub problems: Vec<Problem>,
}

impl StartupReport {
    /// Problems recorded in one phase.
    pub fn problems_in(&self, phase: ProblemPhase) -> Vec<&Problem> {
        self.problems.iter().filter(|p| p.phase == phase).collect()
    }

    /// Whether an extension appears in any problem.
    pub fn has_problem_for(&self, name: &ExtensionName) -> bool {
        self.problems
            .iter()
            .any(|p| p.extension.as_ref() == Some(name))
    }
}

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    /// State composition failed; running with a partial tree is unsafe.
    #[error("state composition failed: {0}")]
    Composition(#[from] StateError),
}

/// A started host.
pub struct Host {
    /// The shared capability registry.
    pub registry: Arc<CapabilityRegistry>,
    /// The composed state tree.
    pub state: StateTree,
    /// What happened during startup.
    pub report: StartupReport,
}

/// Run the startup routine.
///
/// Extension loading is synchronous and strictly sequential in
/// dependency-resolved order, so registration order is deterministic.
pub async fn start(
    config: &HostConfig,
    provider: Arc<dyn EntryProvider>,
) -> Result<Host, StartupError> {
    let started_at = Utc::now();
    let mut problems: Vec<Problem> = Vec::new();

    let discovery = discover(&config.extension_roots);
    for error in &discovery.errors {
        problems.push(Problem {
            extension: None,
            phase: ProblemPhase::Discovery,
            message: format!("{}: {}", error.path.display(), error.reason),
        });
    }
    info!(
        found = discovery.descriptors.len(),
        skipped = discovery.errors.len(),
        "extension discovery complete"
    );

    let resolution = resolve(&discovery.descriptors);
    for (name, reasons) in &resolution.blocked {
        let rendered: Vec<String> = reasons.iter().map(ToString::to_string).collect();
        problems.push(Problem {
            extension: Some(name.clone()),
            phase: ProblemPhase::Resolution,
            message: rendered.join("; "),
        });
    }

    let registry = Arc::new(CapabilityRegistry::new());
    let mut loader = Loader::new(provider, Arc::clone(&registry));
    let mut loaded: Vec<ExtensionName> = Vec::new();
    for desc in &resolution.ready {
        match loader.load(desc) {
            Ok(()) => loaded.push(desc.name.clone()),
            Err(e) => {
                problems.push(Problem {
                    extension: Some(desc.name.clone()),
                    phase: ProblemPhase::Load,
                    message: e.to_string(),
                });
            }
        }
    }
    info!(loaded = loaded.len(), "extension load phase complete");

    let state = compose(registry.reducer_mounts())?;

    for outcome in run_ready_callbacks(&registry, config.ready_grace()).await {
        match outcome.result {
            ReadyResult::Completed => {}
            ReadyResult::Failed(message) => problems.push(Problem {
                extension: Some(outcome.name),
                phase: ProblemPhase::Ready,
                message,
            }),
            ReadyResult::StillRunning => problems.push(Problem {
                extension: Some(outcome.name),
                phase: ProblemPhase::Ready,
                message: "deferred callback still running after grace period".to_string(),
            }),
        }
    }

    for problem in &problems {
        warn!(%problem, "startup problem");
    }

    Ok(Host {
        registry,
        state,
        report: StartupReport {
            started_at,
            loaded,
            problems,
        },
    })
}
