//! The `resolve` subcommand.

use std::path::Path;

use bpak_core::{Context, Error, SelectionMode, resolver};

/// Print the ordered build list for `unit`, one name per line.
pub fn resolve(context_dir: &Path, unit: &str, mode: SelectionMode) -> Result<(), Error> {
    let context = Context::load(context_dir)?;
    let graph = context.graph()?;
    let order = resolver::resolve(&graph, &unit.into(), mode)?;
    for name in &order {
        println!("{name}");
    }
    Ok(())
}
