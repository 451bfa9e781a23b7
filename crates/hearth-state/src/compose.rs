//! Mount validation and construction of the composed state tree.

use std::collections::HashMap;
use std::sync::Arc;

use hearth_core::{ActionTag, ExtensionName, StatePath};
use serde_json::Value;
use tracing::debug;

use crate::errors::StateError;
use crate::tree::StateTree;

/// A pure state-transition handler.
///
/// Receives the current subtree value and the action payload, returns the
/// new subtree value. Must not mutate its input (enforced by `&Value`);
/// errors reject the whole dispatch atomically.
pub type TransitionFn = Arc<dyn Fn(&Value, &Value) -> Result<Value, String> + Send + Sync>;

/// One extension's reducer table, mounted at a declared state path.
#[derive(Clone)]
pub struct ReducerMount {
    /// Extension that registered this reducer.
    pub owner: ExtensionName,
    /// Where in the tree this reducer's output is written.
    pub path: StatePath,
    /// Transition handlers keyed by action tag.
    pub handlers: HashMap<ActionTag, TransitionFn>,
    /// Initial subtree value; `null` when absent.
    pub initial: Option<Value>,
}

/// Merge reducer mounts into a single state tree.
///
/// Validation runs before anything is mounted: any pair of mounts with
/// overlapping paths (equal, or one a prefix of the other) fails the whole
/// composition with [`StateError::RegistrationConflict`] naming both owners
/// and both paths.
pub fn compose(mounts: Vec<ReducerMount>) -> Result<StateTree, StateError> {
    for (i, first) in mounts.iter().enumerate() {
        for second in &mounts[i + 1..] {
            if first.path.overlaps(&second.path) {
                return Err(StateError::RegistrationConflict {
                    first_owner: first.owner.clone(),
                    first_path: first.path.clone(),
                    second_owner: second.owner.clone(),
                    second_path: second.path.clone(),
                });
            }
        }
    }

    debug!(mounts = mounts.len(), "composed state tree");
    Ok(StateTree::new(mounts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn mount(owner: &str, path: &[&str]) -> ReducerMount {
        ReducerMount {
            owner: ExtensionName::new(owner),
            path: StatePath::new(path.iter().copied()),
            handlers: HashMap::new(),
            initial: None,
        }
    }

    #[test]
    fn empty_composition_succeeds() {
        let tree = compose(Vec::new()).unwrap();
        assert_eq!(tree.snapshot(), json!({}));
    }

    #[test]
    fn disjoint_paths_compose() {
        let tree = compose(vec![
            mount("ext-a", &["mods"]),
            mount("ext-b", &["downloads"]),
            mount("ext-c", &["ui", "panels"]),
        ])
        .unwrap();
        assert_eq!(
            tree.snapshot(),
            json!({"mods": null, "downloads": null, "ui": {"panels": null}})
        );
    }

    #[test]
    fn prefix_overlap_names_both_owners() {
        let err = compose(vec![
            mount("ext-a", &["mods"]),
            mount("ext-b", &["mods", "flags"]),
        ])
        .unwrap_err();
        assert_matches!(
            err,
            StateError::RegistrationConflict {
                ref first_owner,
                ref second_owner,
                ..
            } if first_owner.as_str() == "ext-a" && second_owner.as_str() == "ext-b"
        );
        let rendered = err.to_string();
        assert!(rendered.contains("ext-a"));
        assert!(rendered.contains("ext-b"));
        assert!(rendered.contains("mods.flags"));
    }

    #[test]
    fn identical_paths_conflict() {
        let err = compose(vec![mount("ext-a", &["mods"]), mount("ext-b", &["mods"])])
            .unwrap_err();
        assert_matches!(err, StateError::RegistrationConflict { .. });
    }

    #[test]
    fn initial_values_are_mounted() {
        let mut m = mount("ext-a", &["mods"]);
        m.initial = Some(json!({"enabled": []}));
        let tree = compose(vec![m]).unwrap();
        assert_eq!(tree.snapshot(), json!({"mods": {"enabled": []}}));
    }
}
