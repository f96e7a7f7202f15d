//! Shared value types for the bpak build orchestrator.
//!
//! Everything here is an immutable descriptor: units and images are loaded
//! once per run by the context loader and passed around by reference. The
//! core crate owns all behavior.

pub mod definition;
pub mod image;
pub mod unit;

// Re-exports
pub use definition::{BuildDefinition, DefinitionError};
pub use image::{Image, ImageError};
pub use unit::{Unit, UnitKind, UnitName, Variant};
