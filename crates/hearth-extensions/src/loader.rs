//! Extension discovery and the load-once lifecycle.
//!
//! Discovery enumerates immediate subdirectories of the configured roots
//! and treats each one carrying a well-formed `extension.json` as one
//! extension; malformed or partially installed directories are skipped with
//! a recorded error, never aborting the scan.
//!
//! Loading drives one descriptor through its lifecycle exactly once per
//! process: dependency check, entry resolution, a single controlled entry
//! invocation against a fresh context, and outcome recording. A failure in
//! one extension never prevents others from loading.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use hearth_core::ExtensionName;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::compat::LegacyContext;
use crate::context::{ExtensionContext, RegistrationSurface};
use crate::entry::EntryProvider;
use crate::errors::ExtensionError;
use crate::manifest::ExtensionManifest;
use crate::registry::CapabilityRegistry;
use crate::types::{
    DiscoveryError, DiscoveryResult, ExtensionDescriptor, LoadOutcome, MissingDependency,
};

/// Scan the extension roots for installed extensions.
///
/// Deterministic: descriptors come back sorted by name; a duplicate name in
/// a later directory is recorded as an error and skipped.
pub fn discover(roots: &[PathBuf]) -> DiscoveryResult {
    let mut found: Vec<ExtensionDescriptor> = Vec::new();
    let mut errors: Vec<DiscoveryError> = Vec::new();

    for root in roots {
        if !root.is_dir() {
            errors.push(DiscoveryError {
                path: root.clone(),
                reason: "extension root is not a directory".to_string(),
            });
            continue;
        }

        for dir_entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_dir())
        {
            let dir = dir_entry.path().to_path_buf();
            match ExtensionManifest::load(&dir) {
                Ok(manifest) => {
                    debug!(path = %dir.display(), name = %manifest.name, "discovered extension");
                    found.push(manifest.into_descriptor(dir));
                }
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "skipping malformed extension directory");
                    errors.push(DiscoveryError {
                        path: dir,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    found.sort_by(|a, b| a.name.cmp(&b.name));
    let mut descriptors: Vec<ExtensionDescriptor> = Vec::with_capacity(found.len());
    for desc in found {
        if descriptors.iter().any(|kept| kept.name == desc.name) {
            errors.push(DiscoveryError {
                path: desc.root.clone(),
                reason: format!("duplicate extension name '{}'", desc.name),
            });
        } else {
            descriptors.push(desc);
        }
    }

    DiscoveryResult {
        descriptors,
        errors,
    }
}

/// Drives extensions through their load lifecycle, exactly once each.
pub struct Loader {
    provider: Arc<dyn EntryProvider>,
    registry: Arc<CapabilityRegistry>,
    outcomes: HashMap<ExtensionName, LoadOutcome>,
}

impl Loader {
    /// Build a loader over the host's module table and registry.
    pub fn new(provider: Arc<dyn EntryProvider>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            provider,
            registry,
            outcomes: HashMap::new(),
        }
    }

    /// Load one extension.
    ///
    /// Must be called in dependency-resolved order: a descriptor whose
    /// requirement has not reached [`LoadOutcome::Loaded`] is recorded as
    /// blocked. Re-loading a name — even after a failure — returns
    /// [`ExtensionError::AlreadyLoaded`] to avoid partial re-registration.
    pub fn load(&mut self, desc: &ExtensionDescriptor) -> Result<(), ExtensionError> {
        if self.outcomes.contains_key(&desc.name) {
            return Err(ExtensionError::AlreadyLoaded {
                name: desc.name.clone(),
            });
        }

        // Requirements resolved earlier in the load order must have landed.
        let unsatisfied: Vec<MissingDependency> = desc
            .requires
            .iter()
            .filter_map(|req| match self.outcomes.get(req) {
                Some(LoadOutcome::Loaded) => None,
                Some(_) => Some(MissingDependency::NotReady(req.clone())),
                None => Some(MissingDependency::NotPresent(req.clone())),
            })
            .collect();
        if let Some(first) = unsatisfied.first() {
            let dependency = match first {
                MissingDependency::NotPresent(n) | MissingDependency::NotReady(n) => n.clone(),
                MissingDependency::Cycle(members) => {
                    members.first().cloned().unwrap_or_else(|| desc.name.clone())
                }
            };
            warn!(extension = %desc.name, dependency = %dependency, "blocked: dependency not ready");
            let _ = self
                .outcomes
                .insert(desc.name.clone(), LoadOutcome::Blocked(unsatisfied));
            return Err(ExtensionError::DependencyNotReady {
                name: desc.name.clone(),
                dependency,
            });
        }

        let Some(module) = self.provider.module(&desc.entry) else {
            let err = ExtensionError::ModuleNotRegistered {
                entry: desc.entry.clone(),
            };
            self.record_failure(desc, err.to_string());
            return Err(err);
        };

        let Some((shape, entry_point)) = module.resolve() else {
            // A diagnostic, not a hard failure of the host: the extension is
            // recorded as failed and everything else proceeds.
            warn!(extension = %desc.name, entry = %desc.entry, "module exposes no recognized entry point");
            let err = ExtensionError::NoRecognizedEntry {
                entry: desc.entry.clone(),
            };
            self.record_failure(desc, err.to_string());
            return Err(err);
        };

        debug!(extension = %desc.name, shape, legacy = desc.legacy, "invoking entry point");
        let mut context: Box<dyn RegistrationSurface> = if desc.legacy {
            Box::new(LegacyContext::new(ExtensionContext::new(
                desc.name.clone(),
                Arc::clone(&self.registry),
            )))
        } else {
            Box::new(ExtensionContext::new(
                desc.name.clone(),
                Arc::clone(&self.registry),
            ))
        };

        match entry_point(&mut *context) {
            Ok(true) => {
                info!(extension = %desc.name, "loaded");
                let _ = self.outcomes.insert(desc.name.clone(), LoadOutcome::Loaded);
                Ok(())
            }
            Ok(false) => {
                let message = "entry point reported unsuccessful registration".to_string();
                self.retract_and_fail(desc, message.clone());
                Err(ExtensionError::EntryFailed {
                    name: desc.name.clone(),
                    message,
                })
            }
            Err(message) => {
                self.retract_and_fail(desc, message.clone());
                Err(ExtensionError::EntryFailed {
                    name: desc.name.clone(),
                    message,
                })
            }
        }
    }

    /// The recorded outcome for an extension, if it was driven yet.
    pub fn outcome(&self, name: &ExtensionName) -> Option<&LoadOutcome> {
        self.outcomes.get(name)
    }

    /// All recorded outcomes.
    pub fn outcomes(&self) -> &HashMap<ExtensionName, LoadOutcome> {
        &self.outcomes
    }

    /// Whether an extension completed registration successfully.
    pub fn is_ready(&self, name: &ExtensionName) -> bool {
        matches!(self.outcomes.get(name), Some(LoadOutcome::Loaded))
    }

    fn record_failure(&mut self, desc: &ExtensionDescriptor, message: String) {
        let _ = self
            .outcomes
            .insert(desc.name.clone(), LoadOutcome::Failed(message));
    }

    fn retract_and_fail(&mut self, desc: &ExtensionDescriptor, message: String) {
        // Drop whatever the failed entry point managed to register so the
        // registry never carries a partially registered extension.
        let retracted = self.registry.retract(&desc.name);
        warn!(extension = %desc.name, retracted, error = %message, "entry point failed");
        self.record_failure(desc, message);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::entry::{EntryPoint, ModuleTable};

    fn write_extension(root: &std::path::Path, name: &str, manifest: &str) {
        let dir = root.join(name);
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join("extension.json"), manifest).unwrap();
    }

    fn descriptor(name: &str, requires: &[&str]) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: ExtensionName::new(name),
            root: PathBuf::from("/tmp/unused"),
            entry: name.to_string(),
            legacy: false,
            requires: requires.iter().map(|r| ExtensionName::new(*r)).collect(),
            version: None,
        }
    }

    fn registering_entry(capability_type: &'static str) -> EntryPoint {
        Arc::new(move |ctx| {
            ctx.register_capability(capability_type, json!(true));
            Ok(true)
        })
    }

    // --- discovery ---

    #[test]
    fn discover_skips_malformed_and_continues() {
        let root = tempfile::tempdir().unwrap();
        write_extension(root.path(), "good", r#"{"name": "good"}"#);
        write_extension(root.path(), "broken", "{not json");
        std::fs::create_dir(root.path().join("empty")).unwrap();

        let result = discover(&[root.path().to_path_buf()]);
        assert_eq!(result.descriptors.len(), 1);
        assert_eq!(result.descriptors[0].name.as_str(), "good");
        // broken manifest + missing manifest
        assert_eq!(result.errors.len(), 2);
    }

    #[test]
    fn discover_is_sorted_and_rejects_duplicates() {
        let root_a = tempfile::tempdir().unwrap();
        let root_b = tempfile::tempdir().unwrap();
        write_extension(root_a.path(), "zeta", r#"{"name": "zeta"}"#);
        write_extension(root_a.path(), "alpha", r#"{"name": "alpha"}"#);
        write_extension(root_b.path(), "other-dir", r#"{"name": "alpha"}"#);

        let result = discover(&[root_a.path().to_path_buf(), root_b.path().to_path_buf()]);
        let names: Vec<&str> = result
            .descriptors
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].reason.contains("duplicate"));
    }

    #[test]
    fn discover_missing_root_is_recorded() {
        let result = discover(&[PathBuf::from("/definitely/not/a/real/root")]);
        assert!(result.descriptors.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    // --- loading ---

    fn loader_with(entries: Vec<(&str, EntryPoint)>) -> Loader {
        let mut table = ModuleTable::new();
        for (name, entry) in entries {
            table.register_bare(name, entry);
        }
        Loader::new(Arc::new(table), Arc::new(CapabilityRegistry::new()))
    }

    #[test]
    fn load_runs_entry_and_records_outcome() {
        let mut loader = loader_with(vec![("ext-a", registering_entry("installer"))]);
        loader.load(&descriptor("ext-a", &[])).unwrap();
        assert!(loader.is_ready(&ExtensionName::new("ext-a")));
    }

    #[test]
    fn reload_is_rejected_even_after_failure() {
        let failing: EntryPoint = Arc::new(|_| Err("boom".to_string()));
        let mut loader = loader_with(vec![("ext-a", failing)]);
        let desc = descriptor("ext-a", &[]);

        assert_matches!(loader.load(&desc), Err(ExtensionError::EntryFailed { .. }));
        assert_matches!(loader.load(&desc), Err(ExtensionError::AlreadyLoaded { .. }));
        assert_matches!(
            loader.outcome(&desc.name),
            Some(LoadOutcome::Failed(_))
        );
    }

    #[test]
    fn failed_entry_registrations_are_retracted() {
        let half_registering: EntryPoint = Arc::new(|ctx| {
            ctx.register_capability("installer", json!(1));
            Err("failed after registering".to_string())
        });
        let mut table = ModuleTable::new();
        table.register_bare("ext-a", half_registering);
        let registry = Arc::new(CapabilityRegistry::new());
        let mut loader = Loader::new(Arc::new(table), Arc::clone(&registry));

        let _ = loader.load(&descriptor("ext-a", &[]));
        assert!(registry.is_empty());
    }

    #[test]
    fn unready_dependency_blocks_dependent() {
        let failing: EntryPoint = Arc::new(|_| Ok(false));
        let mut loader = loader_with(vec![
            ("ext-a", failing),
            ("ext-b", registering_entry("x")),
        ]);

        let _ = loader.load(&descriptor("ext-a", &[]));
        let err = loader.load(&descriptor("ext-b", &["ext-a"])).unwrap_err();
        assert_matches!(err, ExtensionError::DependencyNotReady { .. });
        assert_matches!(
            loader.outcome(&ExtensionName::new("ext-b")),
            Some(LoadOutcome::Blocked(reasons))
                if reasons == &[MissingDependency::NotReady(ExtensionName::new("ext-a"))]
        );
    }

    #[test]
    fn failure_does_not_prevent_unrelated_loads() {
        let failing: EntryPoint = Arc::new(|_| Err("boom".to_string()));
        let mut loader = loader_with(vec![
            ("ext-a", failing),
            ("ext-d", registering_entry("x")),
        ]);

        let _ = loader.load(&descriptor("ext-a", &[]));
        loader.load(&descriptor("ext-d", &[])).unwrap();
        assert!(loader.is_ready(&ExtensionName::new("ext-d")));
    }

    #[test]
    fn unregistered_module_is_a_recorded_failure() {
        let mut loader = loader_with(vec![]);
        let err = loader.load(&descriptor("ext-a", &[])).unwrap_err();
        assert_matches!(err, ExtensionError::ModuleNotRegistered { .. });
        assert_matches!(
            loader.outcome(&ExtensionName::new("ext-a")),
            Some(LoadOutcome::Failed(_))
        );
    }

    #[test]
    fn module_without_entry_point_is_a_diagnostic() {
        let mut table = ModuleTable::new();
        table.register("ext-a", crate::entry::ExtensionModule::default());
        let mut loader = Loader::new(Arc::new(table), Arc::new(CapabilityRegistry::new()));

        let err = loader.load(&descriptor("ext-a", &[])).unwrap_err();
        assert_matches!(err, ExtensionError::NoRecognizedEntry { .. });
    }

    #[test]
    fn legacy_descriptor_gets_the_shim() {
        // The shim substitutes the registration-time handle; observable via
        // a deferred callback that reads a capability registered afterward
        // by another extension into the same registry.
        let legacy_entry: EntryPoint = Arc::new(|ctx| {
            ctx.once_ready(Box::new(|handle| {
                Box::pin(async move {
                    if handle.owners().is_empty() {
                        Err("expected to see the shared registry".to_string())
                    } else {
                        Ok(())
                    }
                })
            }));
            Ok(true)
        });
        let mut table = ModuleTable::new();
        table.register_bare("old-ext", legacy_entry);
        let registry = Arc::new(CapabilityRegistry::new());
        let mut loader = Loader::new(Arc::new(table), Arc::clone(&registry));

        let mut desc = descriptor("old-ext", &[]);
        desc.legacy = true;
        loader.load(&desc).unwrap();
        assert_eq!(registry.take_deferred().len(), 1);
    }
}
