//! The host-owned capability registry.
//!
//! An append-only catalog of everything extensions have registered. Every
//! record carries the owning extension's identity, supplied by the context
//! that performed the insertion — never by the extension itself — so
//! failures are attributable and a later "disable extension" operation can
//! retract an owner's registrations wholesale.
//!
//! The registry is an explicit, constructed object owned by the host's
//! startup routine; there is no process-wide singleton.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use hearth_core::{ActionTag, ExtensionName, StatePath};
use hearth_state::{ReducerMount, TransitionFn};
use serde_json::Value;
use tracing::debug;

/// A deferred "once ready" callback.
///
/// Invoked once, after all extensions have loaded, with a read handle onto
/// the registry. The synchronous part of the callback runs in registration
/// order; the returned future is awaited as an independent unit of work.
pub type ReadyCallback =
    Box<dyn FnOnce(CapabilityHandle) -> BoxFuture<'static, Result<(), String>> + Send>;

/// Everything an extension can register through its context.
pub enum Registration {
    /// A state-transition table mounted at a declared path.
    Reducer {
        /// Where in the state tree the reducer's output lives.
        path: StatePath,
        /// Transition handlers keyed by action tag.
        handlers: HashMap<ActionTag, TransitionFn>,
        /// Initial subtree value; `null` when absent.
        initial: Option<Value>,
    },
    /// An arbitrary capability payload, looked up by type.
    Capability {
        /// Capability kind (e.g. `installer`, `game`, `attribute`).
        capability_type: String,
        /// Capability payload, opaque to the host.
        payload: Value,
    },
    /// A deferred initialization callback.
    DeferredInit {
        /// The callback to run once the host is ready.
        callback: ReadyCallback,
    },
}

/// One registered capability with its attribution.
#[derive(Debug, Clone)]
pub struct CapabilityRecord {
    /// Extension that registered the capability.
    pub owner: ExtensionName,
    /// Registration sequence number (global, monotonically increasing).
    pub seq: u64,
    /// Capability kind.
    pub capability_type: String,
    /// Capability payload.
    pub payload: Value,
}

struct ReducerRecord {
    seq: u64,
    mount: ReducerMount,
}

struct DeferredRecord {
    seq: u64,
    owner: ExtensionName,
    callback: ReadyCallback,
}

#[derive(Default)]
struct RegistryInner {
    next_seq: u64,
    reducers: Vec<ReducerRecord>,
    capabilities: Vec<CapabilityRecord>,
    deferred: Vec<DeferredRecord>,
}

/// The append-only catalog of extension registrations.
///
/// Writes only happen during the load phase (through extension contexts);
/// afterward the registry is read-mostly for capability lookups.
#[derive(Default)]
pub struct CapabilityRegistry {
    inner: Mutex<RegistryInner>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a registration attributed to `owner`.
    ///
    /// Crate-private: only contexts insert, so the owner identity cannot be
    /// spoofed by extension code.
    pub(crate) fn insert(&self, owner: &ExtensionName, registration: Registration) {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let seq = inner.next_seq;
        inner.next_seq += 1;

        match registration {
            Registration::Reducer {
                path,
                handlers,
                initial,
            } => {
                debug!(owner = %owner, path = %path, "registered reducer");
                inner.reducers.push(ReducerRecord {
                    seq,
                    mount: ReducerMount {
                        owner: owner.clone(),
                        path,
                        handlers,
                        initial,
                    },
                });
            }
            Registration::Capability {
                capability_type,
                payload,
            } => {
                debug!(owner = %owner, capability_type, "registered capability");
                inner.capabilities.push(CapabilityRecord {
                    owner: owner.clone(),
                    seq,
                    capability_type,
                    payload,
                });
            }
            Registration::DeferredInit { callback } => {
                debug!(owner = %owner, "registered deferred init");
                inner.deferred.push(DeferredRecord {
                    seq,
                    owner: owner.clone(),
                    callback,
                });
            }
        }
    }

    /// Capabilities of one type, in registration order.
    pub fn capabilities(&self, capability_type: &str) -> Vec<CapabilityRecord> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner
            .capabilities
            .iter()
            .filter(|c| c.capability_type == capability_type)
            .cloned()
            .collect()
    }

    /// All registered capabilities, in registration order.
    pub fn all_capabilities(&self) -> Vec<CapabilityRecord> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.capabilities.clone()
    }

    /// Every reducer mount, in registration order, ready for composition.
    pub fn reducer_mounts(&self) -> Vec<ReducerMount> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.reducers.iter().map(|r| r.mount.clone()).collect()
    }

    /// Drain the deferred callbacks in registration order.
    pub(crate) fn take_deferred(&self) -> Vec<(ExtensionName, ReadyCallback)> {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let mut drained: Vec<DeferredRecord> = inner.deferred.drain(..).collect();
        drained.sort_by_key(|d| d.seq);
        drained.into_iter().map(|d| (d.owner, d.callback)).collect()
    }

    /// Remove all of one owner's registrations. Returns how many were
    /// retracted.
    pub fn retract(&self, owner: &ExtensionName) -> usize {
        let mut inner = self.inner.lock().expect("registry lock poisoned");
        let before = inner.reducers.len() + inner.capabilities.len() + inner.deferred.len();
        inner.reducers.retain(|r| &r.mount.owner != owner);
        inner.capabilities.retain(|c| &c.owner != owner);
        inner.deferred.retain(|d| &d.owner != owner);
        let removed = before
            - (inner.reducers.len() + inner.capabilities.len() + inner.deferred.len());
        if removed > 0 {
            debug!(owner = %owner, removed, "retracted registrations");
        }
        removed
    }

    /// Distinct owners with at least one live registration, sorted.
    pub fn owners(&self) -> Vec<ExtensionName> {
        let inner = self.inner.lock().expect("registry lock poisoned");
        let mut owners: Vec<ExtensionName> = inner
            .reducers
            .iter()
            .map(|r| r.mount.owner.clone())
            .chain(inner.capabilities.iter().map(|c| c.owner.clone()))
            .chain(inner.deferred.iter().map(|d| d.owner.clone()))
            .collect();
        owners.sort();
        owners.dedup();
        owners
    }

    /// Total number of live registrations.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("registry lock poisoned");
        inner.reducers.len() + inner.capabilities.len() + inner.deferred.len()
    }

    /// Whether the registry holds no registrations.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A cheap, cloneable read handle onto the registry.
///
/// Handed to deferred callbacks and to extensions that captured it during
/// registration; exposes lookups only, never insertion.
#[derive(Clone)]
pub struct CapabilityHandle {
    registry: Arc<CapabilityRegistry>,
}

impl CapabilityHandle {
    /// Build a handle over a shared registry.
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self { registry }
    }

    /// Capabilities of one type, in registration order.
    pub fn capabilities(&self, capability_type: &str) -> Vec<CapabilityRecord> {
        self.registry.capabilities(capability_type)
    }

    /// Distinct owners with at least one live registration, sorted.
    pub fn owners(&self) -> Vec<ExtensionName> {
        self.registry.owners()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn capability(payload: Value) -> Registration {
        Registration::Capability {
            capability_type: "installer".into(),
            payload,
        }
    }

    #[test]
    fn lookups_filter_by_type_and_keep_order() {
        let registry = CapabilityRegistry::new();
        let owner = ExtensionName::new("ext-a");
        registry.insert(&owner, capability(json!(1)));
        registry.insert(
            &owner,
            Registration::Capability {
                capability_type: "game".into(),
                payload: json!("skyrim"),
            },
        );
        registry.insert(&owner, capability(json!(2)));

        let installers = registry.capabilities("installer");
        assert_eq!(installers.len(), 2);
        assert_eq!(installers[0].payload, json!(1));
        assert_eq!(installers[1].payload, json!(2));
        assert!(installers[0].seq < installers[1].seq);
    }

    #[test]
    fn retract_removes_all_and_only_the_owner() {
        let registry = CapabilityRegistry::new();
        let a = ExtensionName::new("ext-a");
        let b = ExtensionName::new("ext-b");
        registry.insert(&a, capability(json!(1)));
        registry.insert(&b, capability(json!(2)));
        registry.insert(
            &a,
            Registration::Reducer {
                path: StatePath::new(["a"]),
                handlers: HashMap::new(),
                initial: None,
            },
        );

        let removed = registry.retract(&a);
        assert_eq!(removed, 2);
        assert_eq!(registry.owners(), vec![b.clone()]);
        assert_eq!(registry.capabilities("installer").len(), 1);
    }

    #[test]
    fn take_deferred_drains_in_registration_order() {
        let registry = CapabilityRegistry::new();
        for name in ["ext-b", "ext-a", "ext-c"] {
            registry.insert(
                &ExtensionName::new(name),
                Registration::DeferredInit {
                    callback: Box::new(|_| Box::pin(async { Ok(()) })),
                },
            );
        }
        let drained = registry.take_deferred();
        let order: Vec<&str> = drained.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["ext-b", "ext-a", "ext-c"]);
        assert!(registry.is_empty());
    }
}
