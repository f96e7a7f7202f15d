//! Durable record of what has been built.
//!
//! The tracker owns an output directory laid out as
//! `<distro>/<release>/<variant>/<unit>/...artifact files...` plus an
//! append-only journal of commits. A commit is conflict-checked: content
//! identical to what is already tracked is success-via-already-tracked,
//! differing content is rejected, never silently overwritten. History is
//! for auditing only, not rollback.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use bpak_schema::{Image, Unit, UnitName, Variant};

use crate::error::Error;

const JOURNAL_FILE: &str = ".journal.jsonl";
const STAGING_DIR: &str = ".staging";

/// Composite key identifying one tracked artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackedKey {
    /// Target image.
    pub image: Image,
    /// Build variant.
    pub variant: Variant,
    /// Unit name.
    pub unit: UnitName,
}

impl TrackedKey {
    /// Create a key from its parts.
    pub fn new(image: &Image, variant: Variant, unit: &UnitName) -> Self {
        Self {
            image: image.clone(),
            variant,
            unit: unit.clone(),
        }
    }

    /// Path of this key relative to the tracker root:
    /// `<distro>/<release>/<variant>/<unit>`.
    pub fn rel_path(&self) -> PathBuf {
        Path::new(self.image.distro())
            .join(self.image.release())
            .join(self.variant.as_str())
            .join(self.unit.as_str())
    }
}

impl std::fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.image, self.variant, self.unit)
    }
}

/// Result of a conflict-checked commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The artifact was newly committed and journaled.
    Committed,
    /// Identical content was already tracked; nothing was written.
    AlreadyTracked,
}

/// One line of the append-only commit journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    /// RFC 3339 commit timestamp.
    pub timestamp: String,
    /// The committed key.
    pub key: TrackedKey,
    /// Relative paths of the committed files, sorted.
    pub files: Vec<String>,
    /// Hex blake3 digest over the sorted file digests.
    pub digest: String,
}

/// Versioned artifact store rooted at an output directory.
///
/// Cross-process safety comes from the commit protocol itself (stage, then
/// rename into place, then re-check on failure); the in-process lock map
/// only serializes duplicate commits within one invocation so at most one
/// of them stages.
#[derive(Debug)]
pub struct ArtifactTracker {
    root: PathBuf,
    locks: Mutex<HashMap<TrackedKey, Arc<Mutex<()>>>>,
}

impl ArtifactTracker {
    /// Open (creating if needed) a tracker rooted at `root`.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors creating the directory layout.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, Error> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self {
            root,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// The tracker's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `key`'s artifact directory.
    pub fn key_path(&self, key: &TrackedKey) -> PathBuf {
        self.root.join(key.rel_path())
    }

    /// Whether an artifact is tracked under `key`.
    pub fn is_tracked(&self, key: &TrackedKey) -> bool {
        dir_has_files(&self.key_path(key))
    }

    /// All keys tracked for `image`, in path order.
    pub fn list_tracked(&self, image: &Image) -> Vec<TrackedKey> {
        let mut keys = Vec::new();
        for variant in Variant::all() {
            let variant_dir = self
                .root
                .join(image.distro())
                .join(image.release())
                .join(variant.as_str());
            let Ok(entries) = fs::read_dir(&variant_dir) else {
                continue;
            };
            let mut unit_dirs: Vec<PathBuf> =
                entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
            unit_dirs.sort();
            for dir in unit_dirs {
                if dir_has_files(&dir)
                    && let Some(name) = dir.file_name().and_then(|n| n.to_str())
                {
                    keys.push(TrackedKey::new(image, variant, &name.into()));
                }
            }
        }
        keys
    }

    /// Commit the install tree at `source_dir` under `key`.
    ///
    /// The tree is staged inside the store and renamed into place, so a
    /// concurrent duplicate commit resolves to exactly one winner; the
    /// loser re-checks and reports [`CommitOutcome::AlreadyTracked`] when
    /// the tracked content matches its own.
    ///
    /// # Errors
    ///
    /// [`Error::OverwriteConflict`] if differing content is already
    /// tracked at this key; I/O errors otherwise.
    pub fn commit(&self, key: &TrackedKey, source_dir: &Path) -> Result<CommitOutcome, Error> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let manifest = collect_files(source_dir)?;
        if manifest.is_empty() {
            return Err(Error::BuildFailed {
                unit: key.unit.clone(),
                variant: key.variant,
                detail: "build produced an empty install tree".to_string(),
            });
        }

        let dest = self.key_path(key);
        if dir_has_files(&dest) {
            return self.compare_tracked(key, source_dir, &manifest, &dest);
        }

        // Stage on the same filesystem, then rename: the rename is the
        // compare-and-set. If someone else won the race, re-check.
        let staging = tempfile::Builder::new()
            .prefix("commit-")
            .tempdir_in(self.root.join(STAGING_DIR))?;
        let staged = staging.path().join("tree");
        copy_tree(source_dir, &staged)?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if let Err(rename_err) = fs::rename(&staged, &dest) {
            if dir_has_files(&dest) {
                return self.compare_tracked(key, source_dir, &manifest, &dest);
            }
            return Err(rename_err.into());
        }

        self.append_journal(key, &manifest)?;
        tracing::info!(key = %key, files = manifest.len(), "committed artifact");
        Ok(CommitOutcome::Committed)
    }

    /// Read the full commit history, oldest first.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors; malformed lines are skipped with a warning.
    pub fn history(&self) -> Result<Vec<CommitRecord>, Error> {
        let path = self.root.join(JOURNAL_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for line in fs::read_to_string(&path)?.lines() {
            match serde_json::from_str(line) {
                Ok(record) => records.push(record),
                Err(err) => tracing::warn!(%err, "skipping malformed journal line"),
            }
        }
        Ok(records)
    }

    /// Check the store against the context for `image`.
    ///
    /// Tracked units absent from the context are an error (the store is
    /// not a subset of the definitions); context units supporting the
    /// image but not yet tracked are only warned about.
    ///
    /// # Errors
    ///
    /// [`Error::InconsistentImageSelection`] listing foreign entries.
    pub fn check_consistency(&self, units: &[Unit], image: &Image) -> Result<(), Error> {
        let known: std::collections::HashSet<&str> =
            units.iter().map(|u| u.name.as_str()).collect();

        let tracked = self.list_tracked(image);
        let foreign: Vec<String> = tracked
            .iter()
            .filter(|key| !known.contains(key.unit.as_str()))
            .map(ToString::to_string)
            .collect();
        if !foreign.is_empty() {
            return Err(Error::InconsistentImageSelection {
                image: image.clone(),
                detail: format!("tracked but not defined: {}", foreign.join(", ")),
            });
        }

        for unit in units {
            if !unit.supports_image(image) {
                continue;
            }
            for &variant in &unit.variants {
                let key = TrackedKey::new(image, variant, &unit.name);
                if !tracked.contains(&key) {
                    tracing::warn!(key = %key, "expected artifact is not tracked yet");
                }
            }
        }
        Ok(())
    }

    fn key_lock(&self, key: &TrackedKey) -> Arc<Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        locks.entry(key.clone()).or_default().clone()
    }

    /// Compare an incoming tree against what is already tracked at `dest`.
    fn compare_tracked(
        &self,
        key: &TrackedKey,
        source_dir: &Path,
        manifest: &[String],
        dest: &Path,
    ) -> Result<CommitOutcome, Error> {
        let tracked = collect_files(dest)?;
        if tracked != *manifest {
            let first = manifest
                .iter()
                .find(|f| !tracked.contains(f))
                .or_else(|| tracked.iter().find(|f| !manifest.contains(f)));
            return Err(Error::OverwriteConflict {
                path: key.rel_path().join(first.map_or("", String::as_str)),
            });
        }
        for rel in manifest {
            let ours = file_digest(&source_dir.join(rel))?;
            let theirs = file_digest(&dest.join(rel))?;
            if ours != theirs {
                return Err(Error::OverwriteConflict {
                    path: key.rel_path().join(rel),
                });
            }
        }
        tracing::debug!(key = %key, "identical content already tracked");
        Ok(CommitOutcome::AlreadyTracked)
    }

    fn append_journal(&self, key: &TrackedKey, manifest: &[String]) -> Result<(), Error> {
        let mut hasher = blake3::Hasher::new();
        for rel in manifest {
            let digest = file_digest(&self.key_path(key).join(rel))?;
            hasher.update(digest.as_bytes());
        }
        let record = CommitRecord {
            timestamp: chrono::Utc::now().to_rfc3339(),
            key: key.clone(),
            files: manifest.to_vec(),
            digest: hex::encode(hasher.finalize().as_bytes()),
        };
        let line = serde_json::to_string(&record).map_err(std::io::Error::other)?;
        let mut journal = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(JOURNAL_FILE))?;
        writeln!(journal, "{line}")?;
        Ok(())
    }
}

/// Relative paths of all files under `root`, sorted.
pub(crate) fn collect_files(root: &Path) -> Result<Vec<String>, Error> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::Io(std::io::Error::other(e)))?;
            files.push(rel.to_string_lossy().into_owned());
        }
    }
    files.sort();
    Ok(files)
}

fn dir_has_files(dir: &Path) -> bool {
    walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .any(|entry| entry.file_type().is_file())
}

fn copy_tree(source: &Path, dest: &Path) -> Result<(), Error> {
    fs::create_dir_all(dest)?;
    let mut options = fs_extra::dir::CopyOptions::new();
    options.content_only = true;
    fs_extra::dir::copy(source, dest, &options)
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(())
}

/// Blake3 digest of one file's content.
fn file_digest(path: &Path) -> Result<blake3::Hash, Error> {
    let bytes = fs::read(path)?;
    Ok(blake3::hash(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fedora() -> Image {
        "fedora/43".parse().unwrap()
    }

    fn key(unit: &str, variant: Variant) -> TrackedKey {
        TrackedKey::new(&fedora(), variant, &unit.into())
    }

    fn install_tree(dir: &Path, files: &[(&str, &str)]) {
        for (rel, content) in files {
            let path = dir.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
    }

    #[test]
    fn commit_then_is_tracked() {
        let store = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("lib/libz.a", "obj"), ("include/zlib.h", "hdr")]);

        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let k = key("zlib", Variant::Release);
        assert!(!tracker.is_tracked(&k));
        let outcome = tracker.commit(&k, src.path()).unwrap();
        assert_eq!(outcome, CommitOutcome::Committed);
        assert!(tracker.is_tracked(&k));
        assert!(
            store
                .path()
                .join("fedora/43/release/zlib/lib/libz.a")
                .exists()
        );
    }

    #[test]
    fn identical_recommit_is_already_tracked() {
        let store = tempfile::tempdir().unwrap();
        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("bin/tool", "v1")]);

        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let k = key("tool", Variant::Release);
        tracker.commit(&k, src.path()).unwrap();
        let outcome = tracker.commit(&k, src.path()).unwrap();
        assert_eq!(outcome, CommitOutcome::AlreadyTracked);
        // Only the first commit reaches the journal.
        assert_eq!(tracker.history().unwrap().len(), 1);
    }

    #[test]
    fn racing_identical_commits_resolve_to_one_winner() {
        // Two tracker instances over one root, like two CLI invocations:
        // they share no in-process lock, only the commit protocol.
        let store = tempfile::tempdir().unwrap();
        let first = ArtifactTracker::open(store.path()).unwrap();
        let second = ArtifactTracker::open(store.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("bin/tool", "v1")]);
        let k = key("tool", Variant::Release);

        let (a, b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| first.commit(&k, src.path()).unwrap());
            let b = scope.spawn(|| second.commit(&k, src.path()).unwrap());
            (a.join().unwrap(), b.join().unwrap())
        });

        let committed = [a, b]
            .iter()
            .filter(|o| **o == CommitOutcome::Committed)
            .count();
        let already = [a, b]
            .iter()
            .filter(|o| **o == CommitOutcome::AlreadyTracked)
            .count();
        assert_eq!((committed, already), (1, 1), "exactly one winner");
        // Only the winning commit reaches the journal.
        assert_eq!(first.history().unwrap().len(), 1);
        assert!(first.is_tracked(&k));
    }

    #[test]
    fn differing_recommit_is_a_conflict() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let k = key("tool", Variant::Release);

        let first = tempfile::tempdir().unwrap();
        install_tree(first.path(), &[("bin/tool", "v1")]);
        tracker.commit(&k, first.path()).unwrap();

        let second = tempfile::tempdir().unwrap();
        install_tree(second.path(), &[("bin/tool", "v2")]);
        let err = tracker.commit(&k, second.path()).unwrap_err();
        assert!(matches!(err, Error::OverwriteConflict { .. }));
        // The original content is untouched.
        let content = fs::read_to_string(store.path().join("fedora/43/release/tool/bin/tool"))
            .unwrap();
        assert_eq!(content, "v1");
    }

    #[test]
    fn list_tracked_is_scoped_to_the_image() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();

        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("f", "x")]);
        tracker.commit(&key("a", Variant::Release), src.path()).unwrap();
        tracker.commit(&key("b", Variant::Debug), src.path()).unwrap();
        let debian: Image = "debian/12".parse().unwrap();
        tracker
            .commit(&TrackedKey::new(&debian, Variant::Release, &"c".into()), src.path())
            .unwrap();

        let keys = tracker.list_tracked(&fedora());
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&key("a", Variant::Release)));
        assert!(keys.contains(&key("b", Variant::Debug)));
    }

    #[test]
    fn journal_records_are_append_only_and_inspectable() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("lib/a", "1"), ("lib/b", "2")]);
        tracker.commit(&key("a", Variant::Release), src.path()).unwrap();

        let history = tracker.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].key, key("a", Variant::Release));
        assert_eq!(history[0].files, vec!["lib/a", "lib/b"]);
        assert_eq!(history[0].digest.len(), 64);
    }

    #[test]
    fn consistency_rejects_foreign_tracked_units() {
        let store = tempfile::tempdir().unwrap();
        let tracker = ArtifactTracker::open(store.path()).unwrap();
        let src = tempfile::tempdir().unwrap();
        install_tree(src.path(), &[("f", "x")]);
        tracker
            .commit(&key("orphan", Variant::Release), src.path())
            .unwrap();

        let err = tracker.check_consistency(&[], &fedora()).unwrap_err();
        assert!(matches!(err, Error::InconsistentImageSelection { .. }));
    }
}
