//! Build script execution.
//!
//! The actual compilation is delegated to a user-supplied script, invoked
//! once per unit variant with the request described through `BPAK_*`
//! environment variables. The script installs its output into
//! `BPAK_INSTALL_DIR`; whatever lands there is what gets tracked.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Context;

use bpak_core::{BuildRequest, BuildStep};

/// Runs an external build script per unit variant.
///
/// Install trees are materialized under a working directory owned by this
/// step, so they stay alive until the orchestrator has committed them.
#[derive(Debug)]
pub struct ScriptBuildStep {
    script: PathBuf,
    work: tempfile::TempDir,
}

impl ScriptBuildStep {
    /// Create a step driving `script`.
    ///
    /// # Errors
    ///
    /// Fails when the working directory cannot be created.
    pub fn new(script: PathBuf) -> std::io::Result<Self> {
        let work = tempfile::Builder::new().prefix("bpak-build-").tempdir()?;
        Ok(Self { script, work })
    }
}

impl BuildStep for ScriptBuildStep {
    fn build(&self, request: &BuildRequest<'_>) -> anyhow::Result<PathBuf> {
        let install = self
            .work
            .path()
            .join(format!("{}-{}", request.unit.name, request.variant));
        fs::create_dir_all(&install)?;

        let mut command = Command::new(&self.script);
        command
            .env("BPAK_UNIT", request.unit.name.as_str())
            .env("BPAK_KIND", request.unit.kind.dir_name())
            .env("BPAK_IMAGE", request.image.to_string())
            .env("BPAK_VARIANT", request.variant.as_str())
            .env("BPAK_INSTALL_DIR", &install);
        for (var, value) in env_vars("BPAK_DEFINE_", &request.unit.definition.defines)? {
            command.env(var, value);
        }
        for (var, value) in env_vars("BPAK_OPTION_", &request.unit.definition.options)? {
            command.env(var, value);
        }

        let status = command
            .status()
            .with_context(|| format!("cannot execute build script '{}'", self.script.display()))?;
        anyhow::ensure!(status.success(), "build script exited with {status}");
        Ok(install)
    }
}

/// Translate definition entries into environment variables.
///
/// Suffix mapping is lossy (`-` and `_` collapse), so two names landing on
/// the same variable would silently shadow each other; that is rejected.
fn env_vars(prefix: &str, map: &BTreeMap<String, String>) -> anyhow::Result<Vec<(String, String)>> {
    let mut seen: BTreeMap<String, &str> = BTreeMap::new();
    let mut vars = Vec::with_capacity(map.len());
    for (name, value) in map {
        let suffix = env_suffix(name);
        if let Some(previous) = seen.insert(suffix.clone(), name) {
            anyhow::bail!(
                "definition names '{previous}' and '{name}' both map to {prefix}{suffix}"
            );
        }
        vars.push((format!("{prefix}{suffix}"), value.clone()));
    }
    Ok(vars)
}

/// Uppercase a definition name into an environment variable suffix.
fn env_suffix(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
