//! Context loader: reads unit descriptors and image definitions from a
//! context directory.
//!
//! Layout on disk:
//!
//! ```text
//! <context>/
//!   images.json            list of image identifiers
//!   package/<name>/*.json  package descriptors
//!   app/<name>/*.json      app descriptors
//! ```
//!
//! Loading validates structure only (names, kinds, image references,
//! definitions). Dependency cycles are deliberately not checked here: a
//! cycle is an error only when a request reaches it, and that check
//! belongs to the resolver.

use std::fs;
use std::path::{Path, PathBuf};

use bpak_schema::{Image, Unit, UnitKind};

use crate::error::Error;
use crate::graph::DependencyGraph;

const IMAGES_FILE: &str = "images.json";

/// A loaded build context: every unit descriptor plus the image universe.
#[derive(Debug, Clone)]
pub struct Context {
    units: Vec<Unit>,
    images: Vec<Image>,
}

impl Context {
    /// Load and validate the context rooted at `root`.
    ///
    /// # Errors
    ///
    /// [`Error::Context`] for structural problems (missing `images.json`,
    /// unparseable descriptors, name/kind mismatches, apps declaring
    /// dependencies, references to undefined images, duplicates);
    /// [`Error::InvalidDefinition`] for malformed build definitions;
    /// I/O errors otherwise.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let images = load_images(&root.join(IMAGES_FILE))?;

        let mut units = Vec::new();
        for kind in [UnitKind::Package, UnitKind::App] {
            let kind_dir = root.join(kind.dir_name());
            if !kind_dir.is_dir() {
                continue;
            }
            let mut unit_dirs: Vec<PathBuf> = fs::read_dir(&kind_dir)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_dir())
                .collect();
            unit_dirs.sort();
            for dir in unit_dirs {
                for file in descriptor_files(&dir)? {
                    units.push(load_unit(&file, &dir, kind, &images)?);
                }
            }
        }

        tracing::debug!(units = units.len(), images = images.len(), "loaded context");
        Ok(Self { units, images })
    }

    /// All unit descriptors in load order (packages first, then apps, each
    /// group sorted by directory name).
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    /// The images defined for this context.
    pub fn images(&self) -> &[Image] {
        &self.images
    }

    /// Whether `image` is defined in this context.
    pub fn has_image(&self, image: &Image) -> bool {
        self.images.contains(image)
    }

    /// Build the dependency graph over the loaded units.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownDependency`] or [`Error::Context`] on duplicate
    /// names, as for [`DependencyGraph::build`].
    pub fn graph(&self) -> Result<DependencyGraph, Error> {
        DependencyGraph::build(&self.units)
    }
}

fn load_images(path: &Path) -> Result<Vec<Image>, Error> {
    let raw = fs::read_to_string(path).map_err(|err| {
        Error::Context(format!("cannot read '{}': {err}", path.display()))
    })?;
    let images: Vec<Image> = serde_json::from_str(&raw)
        .map_err(|err| Error::Context(format!("cannot parse '{}': {err}", path.display())))?;
    if images.is_empty() {
        return Err(Error::Context(format!(
            "'{}' defines no images",
            path.display()
        )));
    }
    for (i, image) in images.iter().enumerate() {
        if images[..i].contains(image) {
            return Err(Error::Context(format!("duplicate image '{image}'")));
        }
    }
    Ok(images)
}

fn descriptor_files(dir: &Path) -> Result<Vec<PathBuf>, Error> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();
    if files.is_empty() {
        return Err(Error::Context(format!(
            "unit directory '{}' contains no descriptor",
            dir.display()
        )));
    }
    Ok(files)
}

fn load_unit(
    file: &Path,
    dir: &Path,
    kind: UnitKind,
    images: &[Image],
) -> Result<Unit, Error> {
    let raw = fs::read_to_string(file)?;
    let unit: Unit = serde_json::from_str(&raw)
        .map_err(|err| Error::Context(format!("cannot parse '{}': {err}", file.display())))?;

    let dir_name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if unit.name.as_str() != dir_name {
        return Err(Error::Context(format!(
            "unit '{}' is defined in directory '{dir_name}', names must match",
            unit.name
        )));
    }
    if unit.kind != kind {
        return Err(Error::Context(format!(
            "unit '{}' lives under '{}/' but declares kind '{}'",
            unit.name,
            kind.dir_name(),
            unit.kind.dir_name()
        )));
    }
    if unit.kind == UnitKind::App && !unit.depends_on.is_empty() {
        return Err(Error::Context(format!(
            "app '{}' declares dependencies, apps must be dependency roots",
            unit.name
        )));
    }
    if unit.images.is_empty() {
        return Err(Error::Context(format!(
            "unit '{}' supports no image",
            unit.name
        )));
    }
    for image in &unit.images {
        if !images.contains(image) {
            return Err(Error::Context(format!(
                "unit '{}' references undefined image '{image}'",
                unit.name
            )));
        }
    }
    unit.definition
        .validate()
        .map_err(|source| Error::InvalidDefinition {
            unit: unit.name.clone(),
            source,
        })?;
    Ok(unit)
}
