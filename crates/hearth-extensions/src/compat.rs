//! Decorator preserving the legacy registration contract.
//!
//! Extensions written against the previous registration surface differ in
//! one place: their deferred-initialization registrar received its API
//! access at registration time instead of being handed a capability handle
//! when the callback fires. [`LegacyContext`] is an explicit wrapper over
//! the canonical [`ExtensionContext`] that intercepts `once_ready` to
//! reproduce that behavior — and to catch and report callback failures per
//! extension — while delegating the rest of the surface unchanged, so the
//! divergence from the canonical contract is auditable in one place.

use std::collections::HashMap;

use hearth_core::{ActionTag, ExtensionName, StatePath};
use hearth_state::TransitionFn;
use serde_json::Value;
use tracing::{debug, warn};

use crate::context::{ExtensionContext, RegistrationSurface};
use crate::registry::{CapabilityHandle, ReadyCallback};

/// Legacy-contract wrapper over the canonical registration surface.
pub struct LegacyContext {
    inner: ExtensionContext,
    adapted_ready: usize,
}

impl LegacyContext {
    /// Wrap a canonical context.
    pub fn new(inner: ExtensionContext) -> Self {
        Self {
            inner,
            adapted_ready: 0,
        }
    }

    /// How many deferred registrations were adapted to the legacy shape.
    pub fn adapted_ready(&self) -> usize {
        self.adapted_ready
    }
}

impl RegistrationSurface for LegacyContext {
    fn extension_name(&self) -> &ExtensionName {
        self.inner.extension_name()
    }

    fn register_reducer(&mut self, path: StatePath, handlers: HashMap<ActionTag, TransitionFn>) {
        self.inner.register_reducer(path, handlers);
    }

    fn register_reducer_with_initial(
        &mut self,
        path: StatePath,
        handlers: HashMap<ActionTag, TransitionFn>,
        initial: Value,
    ) {
        self.inner.register_reducer_with_initial(path, handlers, initial);
    }

    fn register_capability(&mut self, capability_type: &str, payload: Value) {
        self.inner.register_capability(capability_type, payload);
    }

    /// Adapt a legacy deferred registration.
    ///
    /// Under the old contract the callback's API access was fixed at
    /// registration time, so the wrapper captures the handle now and
    /// substitutes it for the one supplied at invocation. Failures inside
    /// the callback are logged against the owning extension and still
    /// surfaced to the ready runner. The underlying registration happens
    /// exactly once.
    fn once_ready(&mut self, callback: ReadyCallback) {
        let name = self.inner.extension_name().clone();
        let captured = self.inner.api();
        debug!(extension = %name, "adapting legacy deferred registration");
        self.adapted_ready += 1;

        let wrapped: ReadyCallback = Box::new(move |_runtime_handle| {
            let fut = callback(captured);
            Box::pin(async move {
                match fut.await {
                    Ok(()) => Ok(()),
                    Err(message) => {
                        warn!(extension = %name, error = %message, "legacy deferred callback failed");
                        Err(message)
                    }
                }
            })
        });
        self.inner.once_ready(wrapped);
    }

    fn api(&self) -> CapabilityHandle {
        self.inner.api()
    }
}
