//! Core types for extension discovery and loading.

use std::collections::BTreeMap;
use std::path::PathBuf;

use hearth_core::ExtensionName;
use serde::{Deserialize, Serialize};

/// Immutable identity and location of a discovered extension.
///
/// Built from the manifest at discovery time; never modified afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionDescriptor {
    /// Declared extension identity.
    pub name: ExtensionName,
    /// The extension's directory.
    pub root: PathBuf,
    /// Registered module key the loader resolves the entry point from.
    pub entry: String,
    /// Whether the extension was written against the legacy registration
    /// contract and needs the compatibility shim.
    pub legacy: bool,
    /// Extensions this one requires, by identity.
    pub requires: Vec<ExtensionName>,
    /// Declared version, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Error encountered while scanning an extension directory.
///
/// Discovery skips the directory, records the error, and continues.
#[derive(Debug, Clone)]
pub struct DiscoveryError {
    /// Path to the problematic directory.
    pub path: PathBuf,
    /// What went wrong.
    pub reason: String,
}

/// Result of scanning the extension roots.
#[derive(Debug, Default)]
pub struct DiscoveryResult {
    /// Descriptors found, sorted by name.
    pub descriptors: Vec<ExtensionDescriptor>,
    /// Per-directory errors encountered during scanning.
    pub errors: Vec<DiscoveryError>,
}

/// Outcome of driving one extension through its load lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Entry point ran and registered successfully.
    Loaded,
    /// Entry point was invoked but failed; its partial registrations were
    /// retracted.
    Failed(String),
    /// Never invoked: one or more dependencies were missing or not ready.
    Blocked(Vec<MissingDependency>),
}

/// Why a declared dependency could not be satisfied.
///
/// `NotPresent` and `NotReady` are reported differently to aid diagnosis:
/// the former means no such extension was discovered, the latter means it
/// exists but failed its own load or is itself blocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingDependency {
    /// No extension with this name was discovered.
    NotPresent(ExtensionName),
    /// The dependency was discovered but is not eligible or failed to load.
    NotReady(ExtensionName),
    /// The dependency edge is part of a requires cycle; members listed.
    Cycle(Vec<ExtensionName>),
}

impl std::fmt::Display for MissingDependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotPresent(name) => write!(f, "'{name}' is not installed"),
            Self::NotReady(name) => write!(f, "'{name}' is present but not ready"),
            Self::Cycle(members) => {
                let names: Vec<&str> = members.iter().map(ExtensionName::as_str).collect();
                write!(f, "dependency cycle: {}", names.join(" -> "))
            }
        }
    }
}

/// Output of dependency resolution.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Extensions eligible to initialize, in dependency-resolved order.
    pub ready: Vec<ExtensionDescriptor>,
    /// Ineligible extensions with the reasons, keyed deterministically.
    pub blocked: BTreeMap<ExtensionName, Vec<MissingDependency>>,
}
