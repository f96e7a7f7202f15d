pub mod context;
pub mod error;
pub mod filter;
pub mod graph;
pub mod orchestrator;
pub mod resolver;
pub mod sysroot;
pub mod tracker;

pub use context::Context;
pub use error::Error;
pub use graph::DependencyGraph;
pub use orchestrator::{BuildRequest, BuildStep, Orchestrator, OutcomeKind, UnitOutcome};
pub use resolver::SelectionMode;
pub use sysroot::{SysrootAssembler, SysrootReport};
pub use tracker::{ArtifactTracker, CommitOutcome, TrackedKey};
