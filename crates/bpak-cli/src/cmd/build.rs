//! The `build` subcommand.

use std::path::PathBuf;

use bpak_core::{
    ArtifactTracker, Context, Error, Orchestrator, OutcomeKind, SelectionMode, UnitOutcome,
};
use bpak_schema::Variant;

use crate::builder::ScriptBuildStep;

/// Everything the `build` subcommand needs.
#[derive(Debug)]
pub struct BuildOptions {
    /// Context directory.
    pub context: PathBuf,
    /// Unit to build, absent for whole-context builds.
    pub target: Option<String>,
    /// Build every unit in the context.
    pub all: bool,
    /// Selection mode for a targeted build.
    pub mode: SelectionMode,
    /// Target image in `distro/release` form.
    pub image: String,
    /// Variants to build.
    pub variants: Vec<Variant>,
    /// Artifact store directory.
    pub output: PathBuf,
    /// Build script to execute per unit variant.
    pub builder: PathBuf,
}

/// Run a build request and report per-unit outcomes.
pub fn build(options: &BuildOptions) -> Result<(), Error> {
    let image = super::parse_image(&options.image)?;
    let context = Context::load(&options.context)?;
    if !context.has_image(&image) {
        return Err(Error::Context(format!(
            "image '{image}' is not defined in the context"
        )));
    }
    let graph = context.graph()?;

    let tracker = ArtifactTracker::open(&options.output)?;
    tracker.check_consistency(context.units(), &image)?;

    let step = ScriptBuildStep::new(options.builder.clone())?;
    let orchestrator = Orchestrator::new(&graph, &tracker, step);

    let outcomes = match (&options.target, options.all) {
        (_, true) => orchestrator.run_all(&image, &options.variants)?,
        (Some(target), false) => {
            orchestrator.run(&target.as_str().into(), options.mode, &image, &options.variants)?
        }
        (None, false) => {
            return Err(Error::Context(
                "no unit named and --all not given".to_string(),
            ));
        }
    };

    report(&outcomes);
    Ok(())
}

fn report(outcomes: &[UnitOutcome]) {
    let mut built = 0;
    for outcome in outcomes {
        match outcome.kind {
            OutcomeKind::Built => {
                built += 1;
                println!("  built {} ({})", outcome.unit, outcome.variant);
            }
            OutcomeKind::Skipped => {
                println!("  {} ({}) already tracked", outcome.unit, outcome.variant);
            }
        }
    }
    println!("{built} built, {} already tracked", outcomes.len() - built);
}
