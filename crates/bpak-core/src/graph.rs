//! In-memory dependency graph over unit descriptors.
//!
//! Forward edges ("depends-on") keep declaration order; reverse edges
//! ("depended-on-by") are derived from the forward edges at construction,
//! so the two can never disagree. Cycle detection is scoped to the closure
//! a request actually touches: a cycle elsewhere in the context is not an
//! error until something reaches it.

use std::collections::HashMap;

use bpak_schema::{Unit, UnitName};

use crate::error::Error;

/// Edge direction for traversals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Follow "depends-on" edges.
    Forward,
    /// Follow "depended-on-by" edges.
    Reverse,
}

/// Adjacency structure over a flat list of [`Unit`] descriptors.
#[derive(Debug)]
pub struct DependencyGraph {
    units: HashMap<UnitName, Unit>,
    order: Vec<UnitName>,
    reverse: HashMap<UnitName, Vec<UnitName>>,
}

impl DependencyGraph {
    /// Build the graph from a flat list of unit descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDependency`] if any unit lists a dependency
    /// name not present in the set, and [`Error::Context`] on duplicate
    /// unit names.
    pub fn build(units: &[Unit]) -> Result<Self, Error> {
        let mut map: HashMap<UnitName, Unit> = HashMap::with_capacity(units.len());
        let mut order = Vec::with_capacity(units.len());
        for unit in units {
            if map.insert(unit.name.clone(), unit.clone()).is_some() {
                return Err(Error::Context(format!("duplicate unit '{}'", unit.name)));
            }
            order.push(unit.name.clone());
        }

        for unit in units {
            for dep in &unit.depends_on {
                if !map.contains_key(dep) {
                    return Err(Error::UnknownDependency {
                        unit: unit.name.clone(),
                        dependency: dep.clone(),
                    });
                }
            }
        }

        // Derived, not authored: reverse edges follow unit insertion order,
        // then declaration order, so traversals stay deterministic.
        let mut reverse: HashMap<UnitName, Vec<UnitName>> = HashMap::with_capacity(units.len());
        for name in &order {
            reverse.entry(name.clone()).or_default();
        }
        for name in &order {
            if let Some(unit) = map.get(name) {
                for dep in &unit.depends_on {
                    if let Some(dependents) = reverse.get_mut(dep) {
                        dependents.push(name.clone());
                    }
                }
            }
        }

        Ok(Self {
            units: map,
            order,
            reverse,
        })
    }

    /// Look up a unit descriptor by name.
    pub fn unit(&self, name: &UnitName) -> Option<&Unit> {
        self.units.get(name)
    }

    /// All unit names in insertion order.
    pub fn names(&self) -> &[UnitName] {
        &self.order
    }

    /// Forward neighbors of `name` in declaration order.
    pub fn dependencies(&self, name: &UnitName) -> &[UnitName] {
        self.units
            .get(name)
            .map_or(&[], |unit| unit.depends_on.as_slice())
    }

    /// Derived reverse neighbors of `name`.
    pub fn dependents(&self, name: &UnitName) -> &[UnitName] {
        self.reverse.get(name).map_or(&[], Vec::as_slice)
    }

    fn neighbors(&self, name: &UnitName, direction: Direction) -> &[UnitName] {
        match direction {
            Direction::Forward => self.dependencies(name),
            Direction::Reverse => self.dependents(name),
        }
    }

    /// Check that the closure reachable from `start` along `direction`
    /// contains no cycle.
    ///
    /// Depth-first with three-color marking; a back-edge to an in-progress
    /// node signals the cycle. A one-node cycle is reported as
    /// [`Error::SelfDependency`].
    ///
    /// # Errors
    ///
    /// [`Error::CycleDetected`] naming the cycle path, or
    /// [`Error::SelfDependency`] for a unit depending on itself.
    pub fn check_acyclic_from(&self, start: &UnitName, direction: Direction) -> Result<(), Error> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            node: &UnitName,
            direction: Direction,
            marks: &mut HashMap<UnitName, Mark>,
            stack: &mut Vec<UnitName>,
        ) -> Result<(), Error> {
            marks.insert(node.clone(), Mark::InProgress);
            stack.push(node.clone());
            for next in graph.neighbors(node, direction) {
                if next == node {
                    return Err(Error::SelfDependency(node.clone()));
                }
                match marks.get(next) {
                    Some(Mark::InProgress) => {
                        let from = stack.iter().position(|n| n == next).unwrap_or(0);
                        let mut chain: Vec<&str> =
                            stack[from..].iter().map(UnitName::as_str).collect();
                        chain.push(next.as_str());
                        return Err(Error::CycleDetected {
                            chain: chain.join(" -> "),
                        });
                    }
                    Some(Mark::Done) => {}
                    None => visit(graph, next, direction, marks, stack)?,
                }
            }
            stack.pop();
            marks.insert(node.clone(), Mark::Done);
            Ok(())
        }

        if !self.units.contains_key(start) {
            return Err(Error::UnknownUnit(start.clone()));
        }
        let mut marks = HashMap::new();
        let mut stack = Vec::new();
        visit(self, start, direction, &mut marks, &mut stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bpak_schema::{BuildDefinition, UnitKind, Variant};

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

    #[test]
    fn derives_reverse_edges() {
        let graph =
            DependencyGraph::build(&[unit("a", &[]), unit("b", &["a"]), unit("c", &["a"])])
                .unwrap();
        let dependents: Vec<UnitName> = graph.dependents(&"a".into()).to_vec();
        assert_eq!(dependents, vec![UnitName::new("b"), UnitName::new("c")]);
        assert!(graph.dependents(&"b".into()).is_empty());
    }

    #[test]
    fn rejects_unknown_dependency() {
        let err = DependencyGraph::build(&[unit("a", &["ghost"])]).unwrap_err();
        assert!(matches!(err, Error::UnknownDependency { .. }));
    }

    #[test]
    fn rejects_duplicate_unit_names() {
        let err = DependencyGraph::build(&[unit("a", &[]), unit("a", &[])]).unwrap_err();
        assert!(matches!(err, Error::Context(_)));
    }

    #[test]
    fn detects_cycle_in_touched_closure() {
        let graph =
            DependencyGraph::build(&[unit("x", &["y"]), unit("y", &["z"]), unit("z", &["x"])])
                .unwrap();
        let err = graph
            .check_acyclic_from(&"x".into(), Direction::Forward)
            .unwrap_err();
        match err {
            Error::CycleDetected { chain } => assert!(chain.contains("x")),
            other => panic!("expected CycleDetected, got {other:?}"),
        }
    }

    #[test]
    fn cycle_outside_closure_is_not_an_error() {
        let graph = DependencyGraph::build(&[
            unit("a", &[]),
            unit("x", &["y"]),
            unit("y", &["x"]),
        ])
        .unwrap();
        assert!(
            graph
                .check_acyclic_from(&"a".into(), Direction::Forward)
                .is_ok()
        );
    }

    #[test]
    fn self_dependency_is_a_one_node_cycle() {
        let graph = DependencyGraph::build(&[unit("a", &["a"])]).unwrap();
        let err = graph
            .check_acyclic_from(&"a".into(), Direction::Forward)
            .unwrap_err();
        assert!(matches!(err, Error::SelfDependency(_)));
    }

    #[test]
    fn reverse_closure_cycles_are_detected_too() {
        let graph =
            DependencyGraph::build(&[unit("x", &["y"]), unit("y", &["x"]), unit("z", &["x"])])
                .unwrap();
        let err = graph
            .check_acyclic_from(&"y".into(), Direction::Reverse)
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }
}
