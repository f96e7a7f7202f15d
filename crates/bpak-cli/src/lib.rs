//! bpak - dependency-aware package build orchestrator.
//!
//! # Overview
//!
//! bpak reads a build context (unit descriptors plus image definitions),
//! derives a deterministic build schedule for a request, runs an external
//! build script per unit variant, and tracks the produced install trees in
//! a conflict-checked artifact store. Tracked artifacts can then be merged
//! into a per-image sysroot.
//!
//! # Store Layout
//!
//! ```text
//! <output>/
//! ├── <distro>/<release>/<variant>/<unit>/   # tracked install trees
//! ├── .journal.jsonl                         # append-only commit journal
//! └── .staging/                              # commit staging area
//! ```

pub mod builder;
pub mod cmd;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use bpak_core::SelectionMode;
use bpak_schema::Variant;

/// Top-level command line interface.
#[derive(Debug, Parser)]
#[command(name = "bpak")]
#[command(author, version, about = "bpak - dependency-aware package build orchestrator")]
pub struct Cli {
    /// Path to the build context directory
    #[arg(long, global = true, env = "BPAK_CONTEXT", default_value = "context")]
    pub context: PathBuf,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// All subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Print the ordered build list for a unit without building anything
    Resolve {
        /// Unit name
        unit: String,
        /// Selection mode flags.
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Build units and track the produced artifacts
    Build {
        /// Unit name
        #[arg(required_unless_present = "all")]
        unit: Option<String>,
        /// Build every unit in the context
        #[arg(long, short = 'a', conflicts_with = "unit")]
        all: bool,
        /// Selection mode flags.
        #[command(flatten)]
        selection: SelectionArgs,
        /// Target image, in distro/release form (e.g. fedora/43)
        #[arg(long)]
        image: String,
        /// Variant to build; repeat for several (defaults to release)
        #[arg(long = "variant", value_parser = parse_variant)]
        variants: Vec<Variant>,
        /// Artifact store directory
        #[arg(long, default_value = "output")]
        output: PathBuf,
        /// Build script executed once per unit variant
        #[arg(long, env = "BPAK_BUILDER", default_value = "./build.sh")]
        builder: PathBuf,
    },
    /// Assemble the sysroot for an image out of tracked artifacts
    Sysroot {
        /// Target image, in distro/release form
        #[arg(long)]
        image: String,
        /// Directory to assemble the sysroot in (must be empty or absent)
        #[arg(long)]
        dest: PathBuf,
        /// Artifact store directory
        #[arg(long, default_value = "output")]
        output: PathBuf,
    },
}

/// How much of the dependency graph a build request pulls in.
///
/// The three flags are mutually exclusive; none of them means the named
/// unit alone.
#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Also build the unit's dependency closure first
    #[arg(long)]
    pub build_deps: bool,

    /// Also rebuild the unit's direct dependents
    #[arg(long, conflicts_with = "build_deps")]
    pub build_deps_on: bool,

    /// Rebuild the unit's full dependent closure, including each
    /// dependent's own dependencies
    #[arg(long, conflicts_with_all = ["build_deps", "build_deps_on"])]
    pub build_deps_on_recursive: bool,
}

impl SelectionArgs {
    /// The selection mode these flags describe.
    pub fn mode(&self) -> SelectionMode {
        if self.build_deps {
            SelectionMode::WithDependencies
        } else if self.build_deps_on {
            SelectionMode::WithDependents
        } else if self.build_deps_on_recursive {
            SelectionMode::WithDependentsRecursive
        } else {
            SelectionMode::Single
        }
    }
}

fn parse_variant(s: &str) -> Result<Variant, String> {
    match s {
        "release" => Ok(Variant::Release),
        "debug" => Ok(Variant::Debug),
        other => Err(format!("unknown variant '{other}', expected release or debug")),
    }
}

/// The variants a build request asked for, defaulting to release.
pub fn requested_variants(variants: &[Variant]) -> Vec<Variant> {
    if variants.is_empty() {
        vec![Variant::Release]
    } else {
        let mut out = Vec::new();
        for &variant in variants {
            if !out.contains(&variant) {
                out.push(variant);
            }
        }
        out
    }
}
