//! bpak command line entry point.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use bpak_cli::cmd::build::BuildOptions;
use bpak_cli::{Cli, Commands, cmd, requested_variants};
use bpak_core::Error;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            exit_code(&err)
        }
    }
}

fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Commands::Resolve { unit, selection } => {
            cmd::resolve::resolve(&cli.context, &unit, selection.mode())
        }
        Commands::Build {
            unit,
            all,
            selection,
            image,
            variants,
            output,
            builder,
        } => cmd::build::build(&BuildOptions {
            context: cli.context,
            target: unit,
            all,
            mode: selection.mode(),
            image,
            variants: requested_variants(&variants),
            output,
            builder,
        }),
        Commands::Sysroot {
            image,
            dest,
            output,
        } => cmd::sysroot::sysroot(&output, &image, &dest),
    }
}

fn report(err: &Error) {
    eprintln!("error: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

/// One exit code per failure kind, so scripts can react to the cause.
fn exit_code(err: &Error) -> ExitCode {
    ExitCode::from(match err {
        Error::Context(_)
        | Error::UnknownUnit(_)
        | Error::UnknownDependency { .. }
        | Error::CycleDetected { .. }
        | Error::SelfDependency(_)
        | Error::UnsupportedDependency { .. }
        | Error::MissingVariant { .. }
        | Error::InvalidDefinition { .. } => 3,
        Error::InconsistentImageSelection { .. } => 4,
        Error::BuildFailed { .. } | Error::NothingToBuild(_) => 5,
        Error::MissingDependency { .. } => 6,
        Error::EmptySysroot(_) | Error::SysrootDestination(_) => 7,
        Error::OverwriteConflict { .. } | Error::FileCollision { .. } => 8,
        Error::Io(_) => 1,
    })
}
