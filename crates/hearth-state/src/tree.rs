//! The composed state tree and action dispatch.

use std::sync::Mutex;

use hearth_core::{Action, ExtensionName, StatePath};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::compose::ReducerMount;
use crate::errors::StateError;

/// Which extensions handled a dispatched action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Owners whose handlers ran, in mount order.
    pub handled: Vec<ExtensionName>,
}

impl DispatchOutcome {
    /// Number of handlers that ran.
    pub fn len(&self) -> usize {
        self.handled.len()
    }

    /// Whether no handler matched the action.
    pub fn is_empty(&self) -> bool {
        self.handled.is_empty()
    }
}

/// The merged state tree produced by [`crate::compose::compose`].
///
/// Dispatches are serialized: the internal lock admits one mutation at a
/// time, and a dispatch either applies every matching handler's output or
/// none of them. Reads return clones of the current tree, so a held
/// snapshot is never affected by later dispatches.
pub struct StateTree {
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for StateTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTree").finish_non_exhaustive()
    }
}

struct Inner {
    root: Value,
    mounts: Vec<ReducerMount>,
}

impl StateTree {
    pub(crate) fn new(mounts: Vec<ReducerMount>) -> Self {
        let mut root = Value::Object(Map::new());
        for mount in &mounts {
            let initial = mount.initial.clone().unwrap_or(Value::Null);
            insert_at(&mut root, &mount.path, initial);
        }
        Self {
            inner: Mutex::new(Inner { root, mounts }),
        }
    }

    /// Dispatch a tagged action against every matching reducer.
    ///
    /// All matching handlers run against the current tree before any output
    /// is written back, so a handler failure rejects the dispatch atomically
    /// and the previous tree is retained.
    pub fn dispatch(&self, action: &Action) -> Result<DispatchOutcome, StateError> {
        let mut inner = self.inner.lock().expect("state tree lock poisoned");

        if let Some(target) = &action.target {
            let mounted = inner.mounts.iter().any(|m| &m.path == target);
            if !mounted {
                return Err(StateError::UnknownPath {
                    path: target.clone(),
                });
            }
        }

        // Phase 1: run every matching handler against the current tree.
        let null = Value::Null;
        let mut outputs: Vec<(StatePath, Value, ExtensionName)> = Vec::new();
        for mount in &inner.mounts {
            if let Some(target) = &action.target {
                if &mount.path != target {
                    continue;
                }
            }
            let Some(handler) = mount.handlers.get(&action.tag) else {
                continue;
            };
            let current = value_at(&inner.root, &mount.path).unwrap_or(&null);
            match handler(current, &action.payload) {
                Ok(next) => {
                    trace!(owner = %mount.owner, path = %mount.path, tag = %action.tag, "handler applied");
                    outputs.push((mount.path.clone(), next, mount.owner.clone()));
                }
                Err(message) => {
                    debug!(owner = %mount.owner, tag = %action.tag, "handler failed, dispatch rejected");
                    return Err(StateError::HandlerFailed {
                        owner: mount.owner.clone(),
                        tag: action.tag.clone(),
                        message,
                    });
                }
            }
        }

        // Phase 2: every handler succeeded, write the outputs back.
        let mut handled = Vec::with_capacity(outputs.len());
        for (path, value, owner) in outputs {
            insert_at(&mut inner.root, &path, value);
            handled.push(owner);
        }

        Ok(DispatchOutcome { handled })
    }

    /// Read the value at a path, if present.
    pub fn get(&self, path: &StatePath) -> Option<Value> {
        let inner = self.inner.lock().expect("state tree lock poisoned");
        value_at(&inner.root, path).cloned()
    }

    /// Clone the whole nested state mapping.
    pub fn snapshot(&self) -> Value {
        let inner = self.inner.lock().expect("state tree lock poisoned");
        inner.root.clone()
    }

    /// Paths with a reducer mounted, in mount order.
    pub fn mounted_paths(&self) -> Vec<StatePath> {
        let inner = self.inner.lock().expect("state tree lock poisoned");
        inner.mounts.iter().map(|m| m.path.clone()).collect()
    }
}

fn value_at<'a>(root: &'a Value, path: &StatePath) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.segments() {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert_at(root: &mut Value, path: &StatePath, value: Value) {
    let Some((last, parents)) = path.segments().split_last() else {
        *root = value;
        return;
    };
    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        current = current
            .as_object_mut()
            .expect("just ensured object")
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    let _ = current
        .as_object_mut()
        .expect("just ensured object")
        .insert(last.clone(), value);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use hearth_core::ActionTag;
    use serde_json::json;

    use super::*;
    use crate::compose::{TransitionFn, compose};

    fn set_handler() -> TransitionFn {
        Arc::new(|_current, payload| Ok(payload.clone()))
    }

    fn counter_handler() -> TransitionFn {
        Arc::new(|current, _payload| {
            let n = current.as_i64().unwrap_or(0);
            Ok(json!(n + 1))
        })
    }

    fn failing_handler(message: &str) -> TransitionFn {
        let message = message.to_string();
        Arc::new(move |_current, _payload| Err(message.clone()))
    }

    fn mount(owner: &str, path: &[&str], handlers: Vec<(&str, TransitionFn)>) -> ReducerMount {
        ReducerMount {
            owner: ExtensionName::new(owner),
            path: StatePath::new(path.iter().copied()),
            handlers: handlers
                .into_iter()
                .map(|(tag, f)| (ActionTag::new(tag), f))
                .collect::<HashMap<_, _>>(),
            initial: None,
        }
    }

    #[test]
    fn dispatch_updates_mounted_subtree() {
        let tree = compose(vec![mount("ext-a", &["mods"], vec![("set", set_handler())])])
            .unwrap();
        let outcome = tree
            .dispatch(&Action::new("set", json!({"enabled": true})))
            .unwrap();
        assert_eq!(outcome.len(), 1);
        assert_eq!(
            tree.get(&StatePath::new(["mods"])),
            Some(json!({"enabled": true}))
        );
    }

    #[test]
    fn unmatched_tag_handles_nothing() {
        let tree = compose(vec![mount("ext-a", &["mods"], vec![("set", set_handler())])])
            .unwrap();
        let outcome = tree.dispatch(&Action::new("other", json!(null))).unwrap();
        assert!(outcome.is_empty());
    }

    #[test]
    fn handler_receives_current_value() {
        let tree = compose(vec![mount(
            "ext-a",
            &["count"],
            vec![("bump", counter_handler())],
        )])
        .unwrap();
        let _ = tree.dispatch(&Action::new("bump", json!(null))).unwrap();
        let _ = tree.dispatch(&Action::new("bump", json!(null))).unwrap();
        assert_eq!(tree.get(&StatePath::new(["count"])), Some(json!(2)));
    }

    #[test]
    fn multiple_mounts_handle_the_same_tag() {
        let tree = compose(vec![
            mount("ext-a", &["a"], vec![("bump", counter_handler())]),
            mount("ext-b", &["b"], vec![("bump", counter_handler())]),
        ])
        .unwrap();
        let outcome = tree.dispatch(&Action::new("bump", json!(null))).unwrap();
        assert_eq!(outcome.len(), 2);
        assert_eq!(tree.get(&StatePath::new(["a"])), Some(json!(1)));
        assert_eq!(tree.get(&StatePath::new(["b"])), Some(json!(1)));
    }

    #[test]
    fn failing_handler_rejects_dispatch_atomically() {
        // ext-a would succeed, ext-b fails: neither output may land.
        let tree = compose(vec![
            mount("ext-a", &["a"], vec![("bump", counter_handler())]),
            mount("ext-b", &["b"], vec![("bump", failing_handler("boom"))]),
        ])
        .unwrap();
        let err = tree.dispatch(&Action::new("bump", json!(null))).unwrap_err();
        assert_matches!(
            err,
            StateError::HandlerFailed { owner, .. } if owner.as_str() == "ext-b"
        );
        assert_eq!(tree.get(&StatePath::new(["a"])), Some(json!(null)));
        assert_eq!(tree.get(&StatePath::new(["b"])), Some(json!(null)));
    }

    #[test]
    fn targeted_dispatch_runs_only_the_target() {
        let tree = compose(vec![
            mount("ext-a", &["a"], vec![("bump", counter_handler())]),
            mount("ext-b", &["b"], vec![("bump", counter_handler())]),
        ])
        .unwrap();
        let outcome = tree
            .dispatch(&Action::new("bump", json!(null)).targeted(StatePath::new(["b"])))
            .unwrap();
        assert_eq!(outcome.handled, vec![ExtensionName::new("ext-b")]);
        assert_eq!(tree.get(&StatePath::new(["a"])), Some(json!(null)));
        assert_eq!(tree.get(&StatePath::new(["b"])), Some(json!(1)));
    }

    #[test]
    fn targeted_dispatch_at_unmounted_path_errors() {
        let tree = compose(vec![mount("ext-a", &["a"], vec![("bump", counter_handler())])])
            .unwrap();
        let err = tree
            .dispatch(&Action::new("bump", json!(null)).targeted(StatePath::new(["missing"])))
            .unwrap_err();
        assert_matches!(err, StateError::UnknownPath { .. });
    }

    #[test]
    fn snapshot_is_detached_from_later_dispatches() {
        let tree = compose(vec![mount(
            "ext-a",
            &["count"],
            vec![("bump", counter_handler())],
        )])
        .unwrap();
        let before = tree.snapshot();
        let _ = tree.dispatch(&Action::new("bump", json!(null))).unwrap();
        assert_eq!(before, json!({"count": null}));
        assert_eq!(tree.snapshot(), json!({"count": 1}));
    }
}
