//! Recognized entry-point shapes and the host's module table.
//!
//! Extensions are compiled plugin modules registered with the host by name;
//! a descriptor's `entry` key resolves to an [`ExtensionModule`] through an
//! [`EntryProvider`]. Three historical export shapes are recognized — a
//! bare callable, a "default"-tagged callable, and a "main"-tagged
//! callable — tried in that order.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::RegistrationSurface;

/// An extension's invocable entry point.
///
/// Receives the registration surface, returns `Ok(true)` on successful
/// registration, `Ok(false)` or `Err` on failure.
pub type EntryPoint =
    Arc<dyn Fn(&mut dyn RegistrationSurface) -> Result<bool, String> + Send + Sync>;

/// The exports a registered module may carry.
#[derive(Default, Clone)]
pub struct ExtensionModule {
    /// Bare callable export.
    pub bare: Option<EntryPoint>,
    /// "default"-tagged export.
    pub default_export: Option<EntryPoint>,
    /// "main"-tagged export.
    pub main: Option<EntryPoint>,
}

impl ExtensionModule {
    /// A module exposing a single bare entry point.
    pub fn from_bare(entry: EntryPoint) -> Self {
        Self {
            bare: Some(entry),
            ..Self::default()
        }
    }

    /// Resolve the module's entry point, trying the recognized shapes in
    /// order: bare, default, main. Returns the shape label alongside the
    /// entry for diagnostics.
    pub fn resolve(&self) -> Option<(&'static str, EntryPoint)> {
        if let Some(entry) = &self.bare {
            return Some(("bare", Arc::clone(entry)));
        }
        if let Some(entry) = &self.default_export {
            return Some(("default", Arc::clone(entry)));
        }
        if let Some(entry) = &self.main {
            return Some(("main", Arc::clone(entry)));
        }
        None
    }
}

/// Maps a descriptor's entry key to its compiled module.
pub trait EntryProvider: Send + Sync {
    /// Look up the module registered under `entry`.
    fn module(&self, entry: &str) -> Option<ExtensionModule>;
}

/// The host's table of registered extension modules.
#[derive(Default)]
pub struct ModuleTable {
    modules: HashMap<String, ExtensionModule>,
}

impl ModuleTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under an entry key. A later registration under the
    /// same key replaces the earlier one.
    pub fn register(&mut self, entry: impl Into<String>, module: ExtensionModule) {
        let _ = self.modules.insert(entry.into(), module);
    }

    /// Convenience: register a bare entry point.
    pub fn register_bare(&mut self, entry: impl Into<String>, entry_point: EntryPoint) {
        self.register(entry, ExtensionModule::from_bare(entry_point));
    }

    /// Number of registered modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl EntryProvider for ModuleTable {
    fn module(&self, entry: &str) -> Option<ExtensionModule> {
        self.modules.get(entry).cloned()
    }
}
