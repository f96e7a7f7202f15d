//! The `sysroot` subcommand.

use std::path::Path;

use bpak_core::{ArtifactTracker, Error, SysrootAssembler};

/// Assemble the sysroot for an image at `dest`.
pub fn sysroot(output: &Path, image: &str, dest: &Path) -> Result<(), Error> {
    let image = super::parse_image(image)?;
    let tracker = ArtifactTracker::open(output)?;
    let report = SysrootAssembler::new(&tracker).assemble(&image, dest)?;
    println!(
        "assembled sysroot for {image} at {} ({} files from {} artifacts)",
        report.root.display(),
        report.file_count,
        report.keys.len()
    );
    Ok(())
}
