//! Selection resolver: turns a (target, mode) pair into an ordered build
//! list.
//!
//! Ordering discipline is reverse postorder over forward edges, so a unit's
//! dependencies always come strictly before the unit itself. Each unit
//! appears exactly once; the first occurrence wins, and edge iteration
//! follows declaration order, which makes the schedule deterministic.

use std::collections::HashSet;

use bpak_schema::UnitName;

use crate::error::Error;
use crate::graph::{DependencyGraph, Direction};

/// How much of the graph a request pulls in around the named target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    /// Only the named unit.
    #[default]
    Single,
    /// The named unit plus the transitive closure of its dependencies.
    WithDependencies,
    /// The named unit plus its direct dependents, one hop only.
    WithDependents,
    /// The named unit plus the transitive closure of its dependents, and
    /// for every dependent pulled in, that dependent's own dependency
    /// closure (a dependent cannot be built without its declared
    /// dependencies).
    WithDependentsRecursive,
}

/// Compute the ordered build list for `target` under `mode`.
///
/// # Errors
///
/// [`Error::UnknownUnit`] if the target does not exist;
/// [`Error::CycleDetected`] / [`Error::SelfDependency`] if the closure the
/// mode touches contains a cycle, before any list is produced.
pub fn resolve(
    graph: &DependencyGraph,
    target: &UnitName,
    mode: SelectionMode,
) -> Result<Vec<UnitName>, Error> {
    if graph.unit(target).is_none() {
        return Err(Error::UnknownUnit(target.clone()));
    }

    match mode {
        SelectionMode::Single => {
            if graph.dependencies(target).contains(target) {
                return Err(Error::SelfDependency(target.clone()));
            }
            Ok(vec![target.clone()])
        }
        SelectionMode::WithDependencies => {
            graph.check_acyclic_from(target, Direction::Forward)?;
            let mut order = Vec::new();
            let mut visited = HashSet::new();
            postorder(graph, target, &mut visited, &mut order, None);
            Ok(order)
        }
        SelectionMode::WithDependents => {
            graph.check_acyclic_from(target, Direction::Reverse)?;
            let mut order = vec![target.clone()];
            for dependent in graph.dependents(target) {
                if !order.contains(dependent) {
                    order.push(dependent.clone());
                }
            }
            Ok(order)
        }
        SelectionMode::WithDependentsRecursive => resolve_dependents_recursive(graph, target),
    }
}

/// Ordered build list for every unit in the graph, dependencies first.
///
/// Used by whole-context builds; every cycle in the graph is touched, so
/// any cycle is fatal here.
///
/// # Errors
///
/// [`Error::CycleDetected`] / [`Error::SelfDependency`] on any cycle.
pub fn resolve_all(graph: &DependencyGraph) -> Result<Vec<UnitName>, Error> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    for name in graph.names() {
        graph.check_acyclic_from(name, Direction::Forward)?;
        postorder(graph, name, &mut visited, &mut order, None);
    }
    Ok(order)
}

/// Target plus transitive reverse closure plus each pulled-in dependent's
/// forward closure. The target's own dependencies are deliberately not
/// scheduled: they must already be tracked, and the orchestrator's
/// pre-flight check enforces that.
fn resolve_dependents_recursive(
    graph: &DependencyGraph,
    target: &UnitName,
) -> Result<Vec<UnitName>, Error> {
    graph.check_acyclic_from(target, Direction::Reverse)?;

    // Transitive reverse closure, depth-first. Discovery order does not
    // matter here; scheduling order comes from the postorder pass below.
    let mut dependents: Vec<UnitName> = Vec::new();
    let mut seen: HashSet<UnitName> = HashSet::from([target.clone()]);
    let mut frontier = vec![target.clone()];
    while let Some(node) = frontier.pop() {
        for dependent in graph.dependents(&node) {
            if seen.insert(dependent.clone()) {
                dependents.push(dependent.clone());
                frontier.push(dependent.clone());
            }
        }
    }

    // A dependent's own dependency closure may contain a cycle the reverse
    // walk never sees; the request still touches it.
    for dependent in &dependents {
        graph.check_acyclic_from(dependent, Direction::Forward)?;
    }

    // The target's dependency closure is excluded from scheduling.
    let mut excluded = HashSet::new();
    collect_forward_closure(graph, target, &mut excluded);
    excluded.remove(target);

    let mut selected: HashSet<UnitName> = HashSet::from([target.clone()]);
    for dependent in &dependents {
        let mut closure = HashSet::new();
        collect_forward_closure(graph, dependent, &mut closure);
        selected.extend(closure.into_iter().filter(|name| !excluded.contains(name)));
    }

    // Dependencies-first ordering restricted to the selected set.
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    postorder(graph, target, &mut visited, &mut order, Some(&selected));
    for dependent in &dependents {
        postorder(graph, dependent, &mut visited, &mut order, Some(&selected));
    }
    Ok(order)
}

fn collect_forward_closure(graph: &DependencyGraph, node: &UnitName, out: &mut HashSet<UnitName>) {
    if !out.insert(node.clone()) {
        return;
    }
    for dep in graph.dependencies(node) {
        collect_forward_closure(graph, dep, out);
    }
}

/// Depth-first postorder over forward edges: emits dependencies before the
/// node itself. When `within` is set, nodes outside it are skipped.
fn postorder(
    graph: &DependencyGraph,
    node: &UnitName,
    visited: &mut HashSet<UnitName>,
    order: &mut Vec<UnitName>,
    within: Option<&HashSet<UnitName>>,
) {
    if let Some(set) = within
        && !set.contains(node)
    {
        return;
    }
    if !visited.insert(node.clone()) {
        return;
    }
    for dep in graph.dependencies(node) {
        postorder(graph, dep, visited, order, within);
    }
    order.push(node.clone());
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpak_schema::{BuildDefinition, Unit, UnitKind, Variant};

    fn unit(name: &str, deps: &[&str]) -> Unit {
        Unit {
            name: name.into(),
            kind: UnitKind::Package,
            depends_on: deps.iter().map(|d| (*d).into()).collect(),
            images: vec!["fedora/43".parse().unwrap()],
            variants: vec![Variant::Release],
            definition: BuildDefinition::default(),
        }
    }

    fn names(list: &[UnitName]) -> Vec<&str> {
        list.iter().map(UnitName::as_str).collect()
    }

    /// Linear chain d -> c -> b -> a.
    fn chain() -> DependencyGraph {
        DependencyGraph::build(&[
            unit("a", &[]),
            unit("b", &["a"]),
            unit("c", &["b"]),
            unit("d", &["c"]),
        ])
        .unwrap()
    }

    #[test]
    fn single_selects_only_the_target() {
        let order = resolve(&chain(), &"d".into(), SelectionMode::Single).unwrap();
        assert_eq!(names(&order), ["d"]);
    }

    #[test]
    fn with_dependencies_orders_deps_first() {
        let order = resolve(&chain(), &"d".into(), SelectionMode::WithDependencies).unwrap();
        assert_eq!(names(&order), ["a", "b", "c", "d"]);
    }

    #[test]
    fn with_dependents_is_one_hop_only() {
        let order = resolve(&chain(), &"a".into(), SelectionMode::WithDependents).unwrap();
        assert_eq!(names(&order), ["a", "b"]);
    }

    #[test]
    fn with_dependents_recursive_pulls_the_full_closure() {
        let order =
            resolve(&chain(), &"a".into(), SelectionMode::WithDependentsRecursive).unwrap();
        assert_eq!(names(&order), ["a", "b", "c", "d"]);
    }

    #[test]
    fn diamond_dependency_appears_exactly_once() {
        let graph = DependencyGraph::build(&[
            unit("d", &[]),
            unit("b", &["d"]),
            unit("c", &["d"]),
            unit("a", &["b", "c"]),
        ])
        .unwrap();
        let order = resolve(&graph, &"a".into(), SelectionMode::WithDependencies).unwrap();
        assert_eq!(names(&order), ["d", "b", "c", "a"]);
    }

    #[test]
    fn recursive_dependents_pull_their_own_sibling_dependencies() {
        // base has two dependents, each needing a disjoint sibling.
        let graph = DependencyGraph::build(&[
            unit("base", &[]),
            unit("s1", &[]),
            unit("s2", &[]),
            unit("p1", &["base", "s1"]),
            unit("p2", &["base", "s2"]),
        ])
        .unwrap();
        let order = resolve(
            &graph,
            &"base".into(),
            SelectionMode::WithDependentsRecursive,
        )
        .unwrap();
        let rendered = names(&order);
        assert_eq!(rendered.len(), 5, "all siblings selected exactly once");
        for (dep, dependent) in [("base", "p1"), ("s1", "p1"), ("base", "p2"), ("s2", "p2")] {
            let dep_at = rendered.iter().position(|n| *n == dep).unwrap();
            let dependent_at = rendered.iter().position(|n| *n == dependent).unwrap();
            assert!(dep_at < dependent_at, "{dep} must precede {dependent}");
        }
    }

    #[test]
    fn recursive_dependents_exclude_the_targets_own_dependencies() {
        let graph = DependencyGraph::build(&[
            unit("lib", &[]),
            unit("mid", &["lib"]),
            unit("top", &["mid"]),
        ])
        .unwrap();
        let order =
            resolve(&graph, &"mid".into(), SelectionMode::WithDependentsRecursive).unwrap();
        assert_eq!(names(&order), ["mid", "top"]);
    }

    #[test]
    fn cycle_fails_before_any_list_is_produced() {
        let graph =
            DependencyGraph::build(&[unit("x", &["y"]), unit("y", &["z"]), unit("z", &["x"])])
                .unwrap();
        for target in ["x", "y", "z"] {
            let err = resolve(&graph, &target.into(), SelectionMode::WithDependencies)
                .unwrap_err();
            assert!(matches!(err, Error::CycleDetected { .. }));
        }
    }

    #[test]
    fn cycle_in_pulled_sub_dependency_fails_fork_requests() {
        // base's dependent drags in a cyclic pair the target never touches
        // directly.
        let graph = DependencyGraph::build(&[
            unit("base", &[]),
            unit("x", &["y"]),
            unit("y", &["x"]),
            unit("fork", &["base", "x"]),
        ])
        .unwrap();
        let err = resolve(
            &graph,
            &"base".into(),
            SelectionMode::WithDependentsRecursive,
        )
        .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn self_dependency_is_reported_for_single_mode() {
        let graph = DependencyGraph::build(&[unit("a", &["a"])]).unwrap();
        let err = resolve(&graph, &"a".into(), SelectionMode::Single).unwrap_err();
        assert!(matches!(err, Error::SelfDependency(_)));
    }

    #[test]
    fn unknown_target_is_rejected() {
        let err = resolve(&chain(), &"ghost".into(), SelectionMode::Single).unwrap_err();
        assert!(matches!(err, Error::UnknownUnit(_)));
    }

    #[test]
    fn resolve_all_orders_the_whole_graph() {
        let order = resolve_all(&chain()).unwrap();
        assert_eq!(names(&order), ["a", "b", "c", "d"]);
    }
}
