//! Build definition descriptors (defines and options).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Errors raised when validating a [`BuildDefinition`].
#[derive(thiserror::Error, Debug)]
pub enum DefinitionError {
    /// A define or option has an empty name.
    #[error("empty {0} name in build definition")]
    EmptyName(&'static str),

    /// A define or option name contains characters outside
    /// `[A-Za-z_][A-Za-z0-9_-]*`.
    #[error("invalid {kind} name '{name}' in build definition")]
    InvalidName {
        /// `define` or `option`.
        kind: &'static str,
        /// The offending name.
        name: String,
    },

    /// A value contains control characters.
    #[error("value for '{0}' contains control characters")]
    InvalidValue(String),
}

/// Opaque build configuration for a unit: defines and options handed to the
/// underlying native build system.
///
/// The core never interprets these beyond well-formedness; they flow through
/// to the external build step verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDefinition {
    /// Preprocessor/build-system defines (`NAME=value`).
    #[serde(default)]
    pub defines: BTreeMap<String, String>,

    /// Build-system options (`NAME=value`).
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl BuildDefinition {
    /// Validate the definition for well-formedness.
    ///
    /// Names must be non-empty and match `[A-Za-z_][A-Za-z0-9_-]*`; values
    /// must be free of control characters. Nothing else is checked — the
    /// semantics belong to the external build system.
    ///
    /// # Errors
    ///
    /// Returns a [`DefinitionError`] describing the first malformed entry.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        for (kind, map) in [("define", &self.defines), ("option", &self.options)] {
            for (name, value) in map {
                if name.is_empty() {
                    return Err(DefinitionError::EmptyName(kind));
                }
                if !is_valid_name(name) {
                    return Err(DefinitionError::InvalidName {
                        kind,
                        name: name.clone(),
                    });
                }
                if value.chars().any(char::is_control) {
                    return Err(DefinitionError::InvalidValue(name.clone()));
                }
            }
        }
        Ok(())
    }

    /// Whether the definition carries no defines and no options.
    pub fn is_empty(&self) -> bool {
        self.defines.is_empty() && self.options.is_empty()
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
