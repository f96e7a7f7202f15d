//! Error taxonomy for the build orchestrator.
//!
//! One variant per failure kind so the CLI layer can map each kind to a
//! distinct process exit code. Errors detected before any build step runs
//! (graph, selection, filter, pre-flight) abort the whole request with
//! nothing built or tracked; errors during execution abort remaining
//! scheduling but leave already-committed artifacts in place.

use bpak_schema::{DefinitionError, Image, UnitName, Variant};
use std::path::PathBuf;
use thiserror::Error;

/// All failure kinds the core can report.
#[derive(Error, Debug)]
pub enum Error {
    /// A unit names a dependency that is not present in the unit set.
    #[error("unit '{unit}' depends on unknown unit '{dependency}'")]
    UnknownDependency {
        /// The unit declaring the dependency.
        unit: UnitName,
        /// The name that could not be resolved.
        dependency: UnitName,
    },

    /// The requested unit name does not exist in the context.
    #[error("unit '{0}' does not exist, please check the name")]
    UnknownUnit(UnitName),

    /// The dependency closure touched by the request contains a cycle.
    #[error("circular dependency detected - {chain}")]
    CycleDetected {
        /// `a -> b -> a` style rendering of the detected cycle.
        chain: String,
    },

    /// A unit depends on itself (a one-node cycle).
    #[error("unit '{0}' depends on itself")]
    SelfDependency(UnitName),

    /// A scheduled unit requires a dependency that cannot be built for the
    /// requested image.
    #[error("unit '{unit}' requires '{dependency}' which does not support image {image}")]
    UnsupportedDependency {
        /// The dependent unit.
        unit: UnitName,
        /// The dependency that does not support the image.
        dependency: UnitName,
        /// The requested image.
        image: Image,
    },

    /// A unit (or a dependency a scheduled unit needs) does not provide a
    /// requested variant.
    #[error("unit '{unit}' does not provide a {variant} build for image {image}")]
    MissingVariant {
        /// The unit lacking the variant.
        unit: UnitName,
        /// The variant the request needs.
        variant: Variant,
        /// The requested image.
        image: Image,
    },

    /// A unit's build definition is malformed.
    #[error("invalid build definition for unit '{unit}'")]
    InvalidDefinition {
        /// The unit with the malformed definition.
        unit: UnitName,
        /// What exactly is malformed.
        #[source]
        source: DefinitionError,
    },

    /// A scheduled unit's dependency is neither scheduled earlier in the
    /// same request nor already tracked in the artifact store.
    #[error(
        "dependency '{dependency}' of unit '{unit}' is neither scheduled nor tracked for image {image}"
    )]
    MissingDependency {
        /// The dependent unit.
        unit: UnitName,
        /// The unsatisfied dependency.
        dependency: UnitName,
        /// The requested image.
        image: Image,
    },

    /// The external build step failed. Artifacts committed earlier in the
    /// same request remain tracked.
    #[error("build failed for unit '{unit}' ({variant}): {detail}")]
    BuildFailed {
        /// The unit whose build step failed.
        unit: UnitName,
        /// The variant being built.
        variant: Variant,
        /// Human-readable detail from the build step.
        detail: String,
    },

    /// A commit found differing content already tracked at its key.
    #[error("refusing to overwrite differing tracked content at {}", path.display())]
    OverwriteConflict {
        /// The conflicting path inside the artifact store.
        path: PathBuf,
    },

    /// Sysroot assembly was requested for an image with zero tracked
    /// artifacts.
    #[error("no artifacts tracked for image {0}, cannot assemble sysroot")]
    EmptySysroot(Image),

    /// Two tracked units install a file at the same relative path.
    #[error("units '{first}' and '{second}' both install '{}'", path.display())]
    FileCollision {
        /// The unit tracked first.
        first: UnitName,
        /// The unit colliding with it.
        second: UnitName,
        /// The contested path, relative to the sysroot root.
        path: PathBuf,
    },

    /// The sysroot destination already exists and is not empty.
    #[error("sysroot destination '{}' exists and is not empty", .0.display())]
    SysrootDestination(PathBuf),

    /// The artifact store holds entries that do not belong to the current
    /// context/image selection.
    #[error("artifact store is inconsistent with the context for image {image}: {detail}")]
    InconsistentImageSelection {
        /// The image the store was checked against.
        image: Image,
        /// Which entries are foreign.
        detail: String,
    },

    /// The request selected no buildable unit for the image.
    #[error("no units to build for image {0}")]
    NothingToBuild(Image),

    /// The context directory is structurally invalid.
    #[error("context error: {0}")]
    Context(String),

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
