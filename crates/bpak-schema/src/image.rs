//! Target platform image identifiers.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Errors raised when parsing an [`Image`] identifier.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    /// The identifier is not in `distro/release` format.
    #[error("invalid image identifier: expected 'distro/release', got '{0}'")]
    InvalidFormat(String),
}

/// A target platform identifier in `distro/release` form, e.g. `fedora/43`.
///
/// Images are defined externally (one per container definition in the
/// context) and are immutable. The two components double as the first two
/// path segments of the artifact store layout.
///
/// # Example
///
/// ```
/// use bpak_schema::Image;
///
/// let image: Image = "fedora/43".parse().unwrap();
/// assert_eq!(image.distro(), "fedora");
/// assert_eq!(image.release(), "43");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Image {
    distro: String,
    release: String,
}

impl Image {
    /// Parse an image identifier from `distro/release` form.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::InvalidFormat`] unless the string contains
    /// exactly one `/` separating two non-empty components.
    pub fn new(s: &str) -> Result<Self, ImageError> {
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(distro), Some(release), None) if !distro.is_empty() && !release.is_empty() => {
                Ok(Self {
                    distro: distro.to_string(),
                    release: release.to_string(),
                })
            }
            _ => Err(ImageError::InvalidFormat(s.to_string())),
        }
    }

    /// Distribution name (`fedora`).
    pub fn distro(&self) -> &str {
        &self.distro
    }

    /// Distribution release (`43`).
    pub fn release(&self) -> &str {
        &self.release
    }
}

impl std::fmt::Display for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.distro, self.release)
    }
}

impl FromStr for Image {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Image {
    type Error = ImageError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<Image> for String {
    fn from(image: Image) -> Self {
        image.to_string()
    }
}
