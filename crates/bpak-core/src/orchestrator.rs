//! Build orchestrator: executes a validated build list against the
//! artifact tracker.
//!
//! Ordering and validation both happen before the first build step runs;
//! from that point on the only visible partial state is the set of
//! already-committed artifacts, which are durable even when a later unit
//! in the same request fails.

use std::collections::HashSet;
use std::path::PathBuf;

use bpak_schema::{Image, Unit, UnitName, Variant};

use crate::error::Error;
use crate::filter;
use crate::graph::DependencyGraph;
use crate::resolver::{self, SelectionMode};
use crate::tracker::{ArtifactTracker, CommitOutcome, TrackedKey};

/// Everything the external build step needs to build one unit variant.
#[derive(Debug)]
pub struct BuildRequest<'a> {
    /// The unit to build.
    pub unit: &'a Unit,
    /// Target image.
    pub image: &'a Image,
    /// Variant to produce.
    pub variant: Variant,
}

/// The external native-build collaborator.
///
/// Implementations compile the unit for the request and return the
/// directory containing its install tree. The orchestrator never inspects
/// how the tree was produced; it only commits it.
pub trait BuildStep {
    /// Build one unit variant, returning the produced install tree.
    ///
    /// # Errors
    ///
    /// Any error aborts scheduling of the remaining units in the request.
    fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<PathBuf>;
}

/// What happened to one unit variant within a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeKind {
    /// The build step ran and the artifact was committed.
    Built,
    /// An identical artifact was already tracked; nothing ran.
    Skipped,
}

/// Per-unit outcome reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    /// The unit.
    pub unit: UnitName,
    /// The variant.
    pub variant: Variant,
    /// Built or skipped.
    pub kind: OutcomeKind,
}

/// Coordinates resolution, filtering and execution for one request.
#[derive(Debug)]
pub struct Orchestrator<'a, S> {
    graph: &'a DependencyGraph,
    tracker: &'a ArtifactTracker,
    step: S,
}

impl<'a, S: BuildStep> Orchestrator<'a, S> {
    /// Create an orchestrator over a graph, a tracker and a build step.
    pub fn new(graph: &'a DependencyGraph, tracker: &'a ArtifactTracker, step: S) -> Self {
        Self {
            graph,
            tracker,
            step,
        }
    }

    /// Compute the ordered build list for `target` under `mode` without
    /// executing anything.
    ///
    /// # Errors
    ///
    /// Same failure kinds as [`resolver::resolve`].
    pub fn resolve(
        &self,
        target: &UnitName,
        mode: SelectionMode,
    ) -> Result<Vec<UnitName>, Error> {
        resolver::resolve(self.graph, target, mode)
    }

    /// Execute the build request for `target` under `mode`.
    ///
    /// Validation (selection, compatibility, pre-flight dependency check)
    /// runs first and aborts with nothing built on any failure. Execution
    /// then walks the list in order: tracked artifacts are skipped, fresh
    /// ones are built and committed, and the first build failure stops
    /// scheduling while keeping earlier commits.
    ///
    /// # Errors
    ///
    /// All kinds from [`Error`]; see the taxonomy for which phase each
    /// belongs to.
    pub fn run(
        &self,
        target: &UnitName,
        mode: SelectionMode,
        image: &Image,
        variants: &[Variant],
    ) -> Result<Vec<UnitOutcome>, Error> {
        let ordered = resolver::resolve(self.graph, target, mode)?;
        self.execute(&ordered, image, variants)
    }

    /// Execute a build of every unit in the context, dependencies first.
    ///
    /// # Errors
    ///
    /// As for [`Orchestrator::run`]; any cycle in the context is fatal
    /// here since the whole graph is touched.
    pub fn run_all(&self, image: &Image, variants: &[Variant]) -> Result<Vec<UnitOutcome>, Error> {
        let ordered = resolver::resolve_all(self.graph)?;
        self.execute(&ordered, image, variants)
    }

    fn execute(
        &self,
        ordered: &[UnitName],
        image: &Image,
        variants: &[Variant],
    ) -> Result<Vec<UnitOutcome>, Error> {
        let selected = filter::filter(self.graph, ordered, image, variants)?;
        if selected.is_empty() {
            return Err(Error::NothingToBuild(image.clone()));
        }
        self.preflight(&selected, image, variants)?;

        let mut outcomes = Vec::new();
        for unit in selected {
            for &variant in variants {
                let key = TrackedKey::new(image, variant, &unit.name);
                if self.tracker.is_tracked(&key) {
                    tracing::info!(key = %key, "already tracked, skipping build");
                    outcomes.push(UnitOutcome {
                        unit: unit.name.clone(),
                        variant,
                        kind: OutcomeKind::Skipped,
                    });
                    continue;
                }

                tracing::info!(unit = %unit.name, %variant, %image, "building");
                let request = BuildRequest {
                    unit,
                    image,
                    variant,
                };
                let install_dir =
                    self.step
                        .build(&request)
                        .map_err(|err| Error::BuildFailed {
                            unit: unit.name.clone(),
                            variant,
                            detail: format!("{err:#}"),
                        })?;

                let kind = match self.tracker.commit(&key, &install_dir)? {
                    CommitOutcome::Committed => OutcomeKind::Built,
                    // Lost a commit race to a concurrent invocation with
                    // identical content; that is success, not failure.
                    CommitOutcome::AlreadyTracked => OutcomeKind::Skipped,
                };
                outcomes.push(UnitOutcome {
                    unit: unit.name.clone(),
                    variant,
                    kind,
                });
            }
        }
        Ok(outcomes)
    }

    /// Every scheduled unit's dependency must be scheduled earlier in this
    /// same request or already tracked for every requested variant.
    fn preflight(
        &self,
        selected: &[&Unit],
        image: &Image,
        variants: &[Variant],
    ) -> Result<(), Error> {
        let mut scheduled: HashSet<&UnitName> = HashSet::new();
        for unit in selected {
            for dep in &unit.depends_on {
                if scheduled.contains(dep) {
                    continue;
                }
                for &variant in variants {
                    let key = TrackedKey::new(image, variant, dep);
                    if !self.tracker.is_tracked(&key) {
                        return Err(Error::MissingDependency {
                            unit: unit.name.clone(),
                            dependency: dep.clone(),
                            image: image.clone(),
                        });
                    }
                }
            }
            scheduled.insert(&unit.name);
        }
        Ok(())
    }
}
