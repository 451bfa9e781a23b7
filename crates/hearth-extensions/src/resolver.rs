//! Dependency resolution over declared `requires` relationships.
//!
//! An extension is eligible to initialize only if every required extension
//! is present and itself eligible, transitively. A cycle or a missing
//! dependency makes the dependent (and anything requiring it) ineligible
//! without blocking unrelated extensions.

use std::collections::{BTreeMap, BTreeSet};

use hearth_core::ExtensionName;
use tracing::debug;

use crate::types::{ExtensionDescriptor, MissingDependency, Resolution};

/// Resolve which extensions may initialize, and in what order.
///
/// Produces a deterministic topological order (ties broken by name) over
/// the `requires` graph. Blocked extensions are reported with reasons that
/// distinguish a dependency that was never discovered from one that is
/// present but ineligible, and name cycle members explicitly.
pub fn resolve(descs: &[ExtensionDescriptor]) -> Resolution {
    let present: BTreeMap<&ExtensionName, &ExtensionDescriptor> =
        descs.iter().map(|d| (&d.name, d)).collect();

    // Kahn-style passes: admit every extension whose requirements are all
    // admitted. Sorted iteration keeps the order deterministic.
    let mut ready_set: BTreeSet<&ExtensionName> = BTreeSet::new();
    let mut ready: Vec<ExtensionDescriptor> = Vec::new();
    loop {
        let mut changed = false;
        for (name, desc) in &present {
            if ready_set.contains(*name) {
                continue;
            }
            let satisfied = desc
                .requires
                .iter()
                .all(|req| ready_set.contains(req));
            if satisfied {
                let _ = ready_set.insert(*name);
                ready.push((*desc).clone());
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    // Everything left is blocked. Cycle detection runs on the stuck
    // subgraph so reasons can name cycle members.
    let stuck: BTreeSet<&ExtensionName> = present
        .keys()
        .filter(|n| !ready_set.contains(**n))
        .copied()
        .collect();
    let cycles = find_cycles(&stuck, &present);

    let mut blocked: BTreeMap<ExtensionName, Vec<MissingDependency>> = BTreeMap::new();
    for name in &stuck {
        let desc = present[*name];
        let mut reasons: Vec<MissingDependency> = Vec::new();
        for req in &desc.requires {
            if !present.contains_key(req) {
                reasons.push(MissingDependency::NotPresent(req.clone()));
            } else if !ready_set.contains(req) {
                let in_shared_cycle = cycles
                    .get(*name)
                    .is_some_and(|members| members.contains(req));
                if in_shared_cycle {
                    let members = cycles[*name].clone();
                    if !reasons
                        .iter()
                        .any(|r| matches!(r, MissingDependency::Cycle(_)))
                    {
                        reasons.push(MissingDependency::Cycle(members));
                    }
                } else {
                    reasons.push(MissingDependency::NotReady(req.clone()));
                }
            }
        }
        let _ = blocked.insert((*name).clone(), reasons);
    }

    debug!(
        ready = ready.len(),
        blocked = blocked.len(),
        "resolved extension dependencies"
    );
    Resolution { ready, blocked }
}

/// Find cycles among the stuck extensions.
///
/// Returns, for each extension on a cycle, the members of that cycle in
/// traversal order. Iterative three-color DFS restricted to stuck nodes.
fn find_cycles(
    stuck: &BTreeSet<&ExtensionName>,
    present: &BTreeMap<&ExtensionName, &ExtensionDescriptor>,
) -> BTreeMap<ExtensionName, Vec<ExtensionName>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: BTreeMap<&ExtensionName, Color> =
        stuck.iter().map(|n| (*n, Color::White)).collect();
    let mut cycles: BTreeMap<ExtensionName, Vec<ExtensionName>> = BTreeMap::new();

    for start in stuck {
        if color[*start] != Color::White {
            continue;
        }
        // Stack of (node, next-edge-index) frames plus the gray path.
        let mut frames: Vec<(&ExtensionName, usize)> = vec![(*start, 0)];
        let mut path: Vec<&ExtensionName> = vec![*start];
        *color.get_mut(*start).expect("start is stuck") = Color::Gray;

        while let Some((node, edge)) = frames.pop() {
            let edges: Vec<&ExtensionName> = present[node]
                .requires
                .iter()
                .filter(|req| stuck.contains(req))
                .collect();

            if edge < edges.len() {
                frames.push((node, edge + 1));
                let next = edges[edge];
                match color[next] {
                    Color::White => {
                        *color.get_mut(next).expect("next is stuck") = Color::Gray;
                        frames.push((next, 0));
                        path.push(next);
                    }
                    Color::Gray => {
                        // Back edge: the gray path from `next` onward is a cycle.
                        let pos = path
                            .iter()
                            .position(|n| *n == next)
                            .expect("gray node is on the path");
                        let members: Vec<ExtensionName> =
                            path[pos..].iter().map(|n| (*n).clone()).collect();
                        for member in &members {
                            let _ = cycles.insert(member.clone(), members.clone());
                        }
                    }
                    Color::Black => {}
                }
            } else {
                *color.get_mut(node).expect("node is stuck") = Color::Black;
                let _ = path.pop();
            }
        }
    }

    cycles
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;

    use super::*;

    fn desc(name: &str, requires: &[&str]) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: ExtensionName::new(name),
            root: PathBuf::from("/tmp/unused"),
            entry: name.to_string(),
            legacy: false,
            requires: requires.iter().map(|r| ExtensionName::new(*r)).collect(),
            version: None,
        }
    }

    fn ready_names(resolution: &Resolution) -> Vec<&str> {
        resolution
            .ready
            .iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    #[test]
    fn independent_extensions_resolve_in_name_order() {
        let resolution = resolve(&[desc("c", &[]), desc("a", &[]), desc("b", &[])]);
        assert_eq!(ready_names(&resolution), vec!["a", "b", "c"]);
        assert!(resolution.blocked.is_empty());
    }

    #[test]
    fn dependency_order_is_respected() {
        let resolution = resolve(&[
            desc("installer", &["archive"]),
            desc("archive", &[]),
            desc("ui", &["installer"]),
        ]);
        assert_eq!(ready_names(&resolution), vec!["archive", "installer", "ui"]);
    }

    #[test]
    fn missing_dependency_blocks_transitively_but_not_unrelated() {
        // c requires b, b requires a (absent); d is independent.
        let resolution = resolve(&[desc("b", &["a"]), desc("c", &["b"]), desc("d", &[])]);
        assert_eq!(ready_names(&resolution), vec!["d"]);

        assert_eq!(
            resolution.blocked[&ExtensionName::new("b")],
            vec![MissingDependency::NotPresent(ExtensionName::new("a"))]
        );
        assert_eq!(
            resolution.blocked[&ExtensionName::new("c")],
            vec![MissingDependency::NotReady(ExtensionName::new("b"))]
        );
    }

    #[test]
    fn cycle_members_are_all_ineligible() {
        let resolution = resolve(&[
            desc("x", &["y"]),
            desc("y", &["x"]),
            desc("solo", &[]),
        ]);
        assert_eq!(ready_names(&resolution), vec!["solo"]);
        assert_matches!(
            &resolution.blocked[&ExtensionName::new("x")][0],
            MissingDependency::Cycle(members) if members.len() == 2
        );
        assert_matches!(
            &resolution.blocked[&ExtensionName::new("y")][0],
            MissingDependency::Cycle(_)
        );
    }

    #[test]
    fn self_require_is_a_cycle_of_length_one() {
        let resolution = resolve(&[desc("selfish", &["selfish"])]);
        assert_matches!(
            &resolution.blocked[&ExtensionName::new("selfish")][0],
            MissingDependency::Cycle(members)
                if members == &vec![ExtensionName::new("selfish")]
        );
    }

    #[test]
    fn downstream_of_a_cycle_is_not_ready_not_cyclic() {
        let resolution = resolve(&[
            desc("x", &["y"]),
            desc("y", &["x"]),
            desc("tail", &["x"]),
        ]);
        assert_eq!(
            resolution.blocked[&ExtensionName::new("tail")],
            vec![MissingDependency::NotReady(ExtensionName::new("x"))]
        );
    }

    #[test]
    fn satisfied_requirements_are_not_reported() {
        let resolution = resolve(&[desc("b", &["a", "ghost"]), desc("a", &[])]);
        let reasons = &resolution.blocked[&ExtensionName::new("b")];
        assert_eq!(
            reasons,
            &vec![MissingDependency::NotPresent(ExtensionName::new("ghost"))]
        );
    }
}
