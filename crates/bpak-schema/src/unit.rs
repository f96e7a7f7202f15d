//! Buildable unit descriptors.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;

use crate::definition::BuildDefinition;
use crate::image::Image;

/// The name of a buildable unit (package or app).
///
/// Names are exact identifiers: dependencies refer to units by name only,
/// with no version component.
///
/// # Example
///
/// ```
/// use bpak_schema::UnitName;
///
/// let name = UnitName::new("zlib");
/// assert_eq!(name.as_str(), "zlib");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitName(String);

impl UnitName {
    /// Create a new `UnitName`.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Return the raw name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for UnitName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Whether a unit is a library-style package or an end-product app.
///
/// Apps sit at the top of the dependency graph: they may depend on
/// packages but nothing depends on them, and the context loader rejects
/// app definitions that declare dependencies of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitKind {
    /// A library or tool installed into the sysroot of dependents.
    #[default]
    Package,
    /// A deployable application.
    App,
}

impl UnitKind {
    /// Directory name used for this kind in contexts and the artifact store.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::App => "app",
        }
    }
}

/// Build variant of a unit.
///
/// A unit declares which variants it provides; a unit may legitimately
/// provide only one of the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Optimized build.
    Release,
    /// Build with debug info, stored separately from release artifacts.
    Debug,
}

impl Variant {
    /// String form used as a path segment in the artifact store.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Release => "release",
            Self::Debug => "debug",
        }
    }

    /// Both variants, release first.
    pub fn all() -> [Self; 2] {
        [Self::Release, Self::Debug]
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buildable unit descriptor as loaded from a context.
///
/// Units are immutable value descriptors; the dependency graph and build
/// schedule are derived from them per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    /// Unique unit name. Must match the context directory it was loaded from.
    pub name: UnitName,

    /// Package or app.
    #[serde(default)]
    pub kind: UnitKind,

    /// Names of units this unit depends on, in declaration order.
    ///
    /// Declaration order is significant: the selection resolver iterates
    /// edges in this order, which makes build schedules deterministic.
    #[serde(default)]
    pub depends_on: Vec<UnitName>,

    /// Images this unit can be built for.
    pub images: Vec<Image>,

    /// Variants this unit provides.
    pub variants: Vec<Variant>,

    /// Opaque build definition, validated for well-formedness only.
    #[serde(default)]
    pub definition: BuildDefinition,
}

impl Unit {
    /// Whether this unit can be built for `image`.
    pub fn supports_image(&self, image: &Image) -> bool {
        self.images.contains(image)
    }

    /// Whether this unit provides `variant`.
    pub fn provides_variant(&self, variant: Variant) -> bool {
        self.variants.contains(&variant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_name_borrows_as_str() {
        let name = UnitName::new("openssl");
        let set: std::collections::HashSet<UnitName> = [name].into_iter().collect();
        assert!(set.contains("openssl"));
    }

    #[test]
    fn variant_serde_is_lowercase() {
        let json = serde_json::to_string(&Variant::Debug).unwrap();
        assert_eq!(json, "\"debug\"");
        let back: Variant = serde_json::from_str("\"release\"").unwrap();
        assert_eq!(back, Variant::Release);
    }

    #[test]
    fn unit_descriptor_roundtrip() {
        let unit = Unit {
            name: "zlib".into(),
            kind: UnitKind::Package,
            depends_on: vec![],
            images: vec!["fedora/43".parse().unwrap()],
            variants: vec![Variant::Release, Variant::Debug],
            definition: BuildDefinition::default(),
        };
        let json = serde_json::to_string(&unit).unwrap();
        let back: Unit = serde_json::from_str(&json).unwrap();
        assert_eq!(back, unit);
    }
}
