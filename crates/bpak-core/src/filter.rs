//! Compatibility filter: validates an ordered build list against an image
//! and a requested variant set.
//!
//! Validation is all-or-nothing at the request level. Any failure here
//! aborts the whole request before a single build step runs, even when a
//! prefix of the list would have succeeded on its own.

use bpak_schema::{Image, Unit, UnitName, Variant};

use crate::error::Error;
use crate::graph::DependencyGraph;

/// Validate `ordered` for `image` and `variants`, returning the applicable
/// units in the same order.
///
/// Units that do not support the image are silently excluded as long as
/// nothing applicable depends on them; an excluded unit that is a hard
/// dependency of an included one fails the request.
///
/// # Errors
///
/// [`Error::UnsupportedDependency`] when an applicable unit requires a
/// dependency that cannot be built for `image`;
/// [`Error::MissingVariant`] when an applicable unit, or a dependency it
/// needs, does not provide a requested variant;
/// [`Error::InvalidDefinition`] when a selected unit's build definition is
/// malformed.
pub fn filter<'g>(
    graph: &'g DependencyGraph,
    ordered: &[UnitName],
    image: &Image,
    variants: &[Variant],
) -> Result<Vec<&'g Unit>, Error> {
    let mut applicable: Vec<&Unit> = Vec::with_capacity(ordered.len());
    for name in ordered {
        let unit = graph
            .unit(name)
            .ok_or_else(|| Error::UnknownUnit(name.clone()))?;
        unit.definition
            .validate()
            .map_err(|source| Error::InvalidDefinition {
                unit: name.clone(),
                source,
            })?;
        if unit.supports_image(image) {
            applicable.push(unit);
        } else {
            tracing::debug!(unit = %name, %image, "excluding unit, image not supported");
        }
    }

    for unit in &applicable {
        for dep_name in &unit.depends_on {
            let dep = graph
                .unit(dep_name)
                .ok_or_else(|| Error::UnknownDependency {
                    unit: unit.name.clone(),
                    dependency: dep_name.clone(),
                })?;
            // A dependency that cannot exist for this image can never
            // satisfy the dependent, whether it was selected or not.
            if !dep.supports_image(image) {
                return Err(Error::UnsupportedDependency {
                    unit: unit.name.clone(),
                    dependency: dep_name.clone(),
                    image: image.clone(),
                });
            }
            for &variant in variants {
                if !dep.provides_variant(variant) {
                    return Err(Error::MissingVariant {
                        unit: dep_name.clone(),
                        variant,
                        image: image.clone(),
                    });
                }
            }
        }
        for &variant in variants {
            if !unit.provides_variant(variant) {
                return Err(Error::MissingVariant {
                    unit: unit.name.clone(),
                    variant,
                    image: image.clone(),
                });
            }
        }
    }

    Ok(applicable)
}
