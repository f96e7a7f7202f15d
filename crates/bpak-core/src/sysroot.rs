//! Sysroot assembler: merges every tracked artifact for one image into a
//! single directory tree.
//!
//! Assembly works on a snapshot of the store taken up front and is
//! all-or-nothing: every collision is found before the first file is
//! copied, so a failed assembly leaves the destination without artifact
//! content.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use bpak_schema::{Image, UnitName, Variant};

use crate::error::Error;
use crate::tracker::{self, ArtifactTracker, TrackedKey};

const MANIFEST_FILE: &str = "built_units.json";

/// What an assembly produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysrootReport {
    /// The assembled sysroot root.
    pub root: PathBuf,
    /// Number of artifact files copied in.
    pub file_count: usize,
    /// The tracked keys that contributed content.
    pub keys: Vec<TrackedKey>,
}

/// Units per variant, written to `built_units.json` at the sysroot root.
#[derive(Debug, Serialize)]
struct Manifest<'a> {
    image: String,
    units: &'a BTreeMap<&'a str, Vec<&'a str>>,
}

/// Assembles sysroots out of an artifact store.
#[derive(Debug)]
pub struct SysrootAssembler<'a> {
    tracker: &'a ArtifactTracker,
}

impl<'a> SysrootAssembler<'a> {
    /// Create an assembler over `tracker`.
    pub fn new(tracker: &'a ArtifactTracker) -> Self {
        Self { tracker }
    }

    /// Assemble the sysroot for `image` at `dest`.
    ///
    /// Each variant gets its own subtree (`dest/release`, `dest/debug`),
    /// and every unit tracked for that variant is merged into it. Two
    /// units installing the same relative path within a variant is a hard
    /// error regardless of content. A `built_units.json` manifest at the
    /// root records which units contributed.
    ///
    /// # Errors
    ///
    /// [`Error::EmptySysroot`] when nothing is tracked for `image`;
    /// [`Error::SysrootDestination`] when `dest` exists and is not empty;
    /// [`Error::FileCollision`] on any path overlap between two units.
    pub fn assemble(&self, image: &Image, dest: &Path) -> Result<SysrootReport, Error> {
        let keys = self.tracker.list_tracked(image);
        if keys.is_empty() {
            return Err(Error::EmptySysroot(image.clone()));
        }
        if dest.exists() && fs::read_dir(dest)?.next().is_some() {
            return Err(Error::SysrootDestination(dest.to_path_buf()));
        }

        // First pass finds every collision before anything is copied.
        let mut planned: BTreeMap<PathBuf, (&TrackedKey, PathBuf)> = BTreeMap::new();
        for key in &keys {
            let source = self.tracker.key_path(key);
            for rel in tracker::collect_files(&source)? {
                let target = Path::new(key.variant.as_str()).join(&rel);
                if let Some((owner, _)) = planned.get(&target) {
                    return Err(Error::FileCollision {
                        first: owner.unit.clone(),
                        second: key.unit.clone(),
                        path: target,
                    });
                }
                planned.insert(target, (key, source.join(&rel)));
            }
        }

        let file_count = planned.len();
        tracing::info!(%image, files = file_count, dest = %dest.display(), "assembling sysroot");
        for (target, (_, source)) in &planned {
            let out = dest.join(target);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, &out)?;
        }
        self.write_manifest(image, dest, &keys)?;

        Ok(SysrootReport {
            root: dest.to_path_buf(),
            file_count,
            keys,
        })
    }

    fn write_manifest(&self, image: &Image, dest: &Path, keys: &[TrackedKey]) -> Result<(), Error> {
        let mut units: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for key in keys {
            units
                .entry(key.variant.as_str())
                .or_default()
                .push(key.unit.as_str());
        }
        for names in units.values_mut() {
            names.sort_unstable();
        }
        let manifest = Manifest {
            image: image.to_string(),
            units: &units,
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
        fs::write(dest.join(MANIFEST_FILE), json)?;
        Ok(())
    }
}

/// Convenience listing of which units a manifest names for a variant.
pub fn units_for_variant(keys: &[TrackedKey], variant: Variant) -> Vec<&UnitName> {
    keys.iter()
        .filter(|key| key.variant == variant)
        .map(|key| &key.unit)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fedora() -> Image {
        "fedora/43".parse().unwrap()
    }

    fn commit(tracker: &ArtifactTracker, unit: &str, variant: Variant, files: &[(&str, &str)]) {
        let src = tempfile::tempdir().unwrap();
        for (rel, content) in files {
            let path = src.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        let key = TrackedKey::new(&fedora(), variant, &unit.into());
        tracker.commit(&key, src.path()).unwrap();
    }

    #[test]
    fn merges_all_tracked_units_into_variant_subtrees() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        commit(&tracker, "zlib", Variant::Release, &[
            ("lib/libz.a", "obj"),
            ("include/zlib.h", "hdr"),
        ]);
        commit(&tracker, "openssl", Variant::Release, &[("lib/libssl.a", "obj")]);
        commit(&tracker, "zlib", Variant::Debug, &[("lib/libz.a", "obj-dbg")]);

        let dest = tempfile::tempdir().unwrap();
        let sysroot = dest.path().join("sysroot");
        let report = SysrootAssembler::new(&tracker)
            .assemble(&fedora(), &sysroot)
            .unwrap();

        assert_eq!(report.file_count, 4);
        assert!(sysroot.join("release/lib/libz.a").exists());
        assert!(sysroot.join("release/include/zlib.h").exists());
        assert!(sysroot.join("release/lib/libssl.a").exists());
        assert!(sysroot.join("debug/lib/libz.a").exists());
        assert_eq!(
            fs::read_to_string(sysroot.join("debug/lib/libz.a")).unwrap(),
            "obj-dbg"
        );
    }

    #[test]
    fn manifest_names_contributing_units_per_variant() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        commit(&tracker, "b", Variant::Release, &[("b.txt", "b")]);
        commit(&tracker, "a", Variant::Release, &[("a.txt", "a")]);

        let dest = tempfile::tempdir().unwrap();
        let sysroot = dest.path().join("sysroot");
        SysrootAssembler::new(&tracker)
            .assemble(&fedora(), &sysroot)
            .unwrap();

        let manifest: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sysroot.join("built_units.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["image"], "fedora/43");
        assert_eq!(manifest["units"]["release"][0], "a");
        assert_eq!(manifest["units"]["release"][1], "b");
    }

    #[test]
    fn empty_store_is_an_error() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let dest = tempfile::tempdir().unwrap();
        let err = SysrootAssembler::new(&tracker)
            .assemble(&fedora(), &dest.path().join("sysroot"))
            .unwrap_err();
        assert!(matches!(err, Error::EmptySysroot(_)));
    }

    #[test]
    fn non_empty_destination_is_refused() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        commit(&tracker, "zlib", Variant::Release, &[("f", "x")]);

        let dest = tempfile::tempdir().unwrap();
        fs::write(dest.path().join("leftover"), "old").unwrap();
        let err = SysrootAssembler::new(&tracker)
            .assemble(&fedora(), dest.path())
            .unwrap_err();
        assert!(matches!(err, Error::SysrootDestination(_)));
    }

    #[test]
    fn path_overlap_is_a_hard_error_even_with_identical_content() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        commit(&tracker, "a", Variant::Release, &[("share/doc/README", "same")]);
        commit(&tracker, "b", Variant::Release, &[("share/doc/README", "same")]);

        let dest = tempfile::tempdir().unwrap();
        let sysroot = dest.path().join("sysroot");
        let err = SysrootAssembler::new(&tracker)
            .assemble(&fedora(), &sysroot)
            .unwrap_err();
        match err {
            Error::FileCollision { first, second, path } => {
                assert_eq!(first.as_str(), "a");
                assert_eq!(second.as_str(), "b");
                assert_eq!(path, Path::new("release/share/doc/README"));
            }
            other => panic!("expected FileCollision, got {other:?}"),
        }
        // Collision detection runs before any copy.
        assert!(!sysroot.join("release").exists());
    }

    #[test]
    fn collisions_across_variants_do_not_conflict() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        commit(&tracker, "zlib", Variant::Release, &[("lib/libz.a", "r")]);
        commit(&tracker, "zlib", Variant::Debug, &[("lib/libz.a", "d")]);

        let dest = tempfile::tempdir().unwrap();
        let sysroot = dest.path().join("sysroot");
        let report = SysrootAssembler::new(&tracker)
            .assemble(&fedora(), &sysroot)
            .unwrap();
        assert_eq!(report.file_count, 2);
        assert_eq!(units_for_variant(&report.keys, Variant::Debug).len(), 1);
    }
}
