//! Subcommand implementations.
//!
//! Each module maps one subcommand onto the core API. Commands return the
//! core error type unchanged so `main` can turn each failure kind into a
//! distinct exit code.

pub mod build;
pub mod resolve;
pub mod sysroot;

use bpak_core::Error;
use bpak_schema::Image;

/// Parse a `distro/release` image argument.
pub(crate) fn parse_image(s: &str) -> Result<Image, Error> {
    s.parse()
        .map_err(|err: bpak_schema::ImageError| Error::Context(err.to_string()))
}
