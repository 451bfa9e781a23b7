//! The capability-registration surface handed to extension entry points.
//!
//! One context is built per extension per host process lifetime. It closes
//! over the extension's identity, so every registration it performs is
//! attributed to that extension — the context, not the extension, supplies
//! the owner. The context is discarded once the synchronous registration
//! phase completes; later asynchronous work uses a captured
//! [`CapabilityHandle`], never the context itself.

use std::collections::HashMap;
use std::sync::Arc;

use hearth_core::{ActionTag, ExtensionName, StatePath};
use hearth_state::TransitionFn;
use serde_json::Value;

use crate::registry::{CapabilityHandle, CapabilityRegistry, ReadyCallback, Registration};

/// What an extension entry point can do during its registration phase.
///
/// The canonical implementation is [`ExtensionContext`]; extensions written
/// against the previous contract receive a [`crate::compat::LegacyContext`]
/// decorator instead.
pub trait RegistrationSurface: Send {
    /// Identity of the extension this surface belongs to.
    fn extension_name(&self) -> &ExtensionName;

    /// Mount a reducer table at `path` with no initial value.
    fn register_reducer(&mut self, path: StatePath, handlers: HashMap<ActionTag, TransitionFn>);

    /// Mount a reducer table at `path` with a declared initial subtree.
    fn register_reducer_with_initial(
        &mut self,
        path: StatePath,
        handlers: HashMap<ActionTag, TransitionFn>,
        initial: Value,
    );

    /// Register a capability payload of the given type.
    fn register_capability(&mut self, capability_type: &str, payload: Value);

    /// Register a deferred callback invoked once all extensions have loaded.
    fn once_ready(&mut self, callback: ReadyCallback);

    /// A read handle onto the registry for captured later use.
    fn api(&self) -> CapabilityHandle;
}

/// The canonical registration surface.
pub struct ExtensionContext {
    name: ExtensionName,
    registry: Arc<CapabilityRegistry>,
}

impl ExtensionContext {
    /// Build the context for one extension.
    pub fn new(name: ExtensionName, registry: Arc<CapabilityRegistry>) -> Self {
        Self { name, registry }
    }
}

impl RegistrationSurface for ExtensionContext {
    fn extension_name(&self) -> &ExtensionName {
        &self.name
    }

    fn register_reducer(&mut self, path: StatePath, handlers: HashMap<ActionTag, TransitionFn>) {
        self.registry.insert(
            &self.name,
            Registration::Reducer {
                path,
                handlers,
                initial: None,
            },
        );
    }

    fn register_reducer_with_initial(
        &mut self,
        path: StatePath,
        handlers: HashMap<ActionTag, TransitionFn>,
        initial: Value,
    ) {
        self.registry.insert(
            &self.name,
            Registration::Reducer {
                path,
                handlers,
                initial: Some(initial),
            },
        );
    }

    fn register_capability(&mut self, capability_type: &str, payload: Value) {
        self.registry.insert(
            &self.name,
            Registration::Capability {
                capability_type: capability_type.to_string(),
                payload,
            },
        );
    }

    fn once_ready(&mut self, callback: ReadyCallback) {
        self.registry
            .insert(&self.name, Registration::DeferredInit { callback });
    }

    fn api(&self) -> CapabilityHandle {
        CapabilityHandle::new(Arc::clone(&self.registry))
    }
}
