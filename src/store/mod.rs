//! Object store port and the filesystem-backed implementation.
//!
//! The pipeline only ever talks to storage through [`ObjectStore`], so tests
//! and deployments can swap the backend without touching pipeline code. Keys
//! are flat `prefix/name` strings; the well-known prefixes live in [`prefix`].

use crate::foundation::error::{ReelError, ReelResult};
use std::path::{Path, PathBuf};

/// Well-known key prefixes used by the pipeline.
pub mod prefix {
    /// Source videos waiting to be fragmented.
    pub const VIDEO_TO_MIX: &str = "video-to-mix";
    /// Voiceover audio tracks, matched to videos by file stem.
    pub const VOICES: &str = "voices";
    /// Background music tracks.
    pub const BACKGROUND_MUSIC: &str = "background-music";
    /// Hook clips prepended to fragments.
    pub const HOOKS: &str = "hooks";
    /// Finished reel fragments.
    pub const REELS: &str = "reels";
    /// Fixed-length segments cut from a source video.
    pub const SEGMENTS: &str = "segments";
    /// Shuffled segment concatenations.
    pub const RANDOMIZED: &str = "randomized";
    /// Videos with intro/outro bumpers attached.
    pub const PROCESSED: &str = "processed";
    /// Transcript JSON documents and SRT exports.
    pub const TRANSCRIPT: &str = "transcript";
}

/// Blob storage seam used by the pipeline.
pub trait ObjectStore {
    /// List keys under `prefix`, returned as full keys in unspecified order.
    fn list(&self, prefix: &str) -> ReelResult<Vec<String>>;

    /// Download the object at `key` to `local_path`.
    fn get(&self, key: &str, local_path: &Path) -> ReelResult<()>;

    /// Upload the file at `local_path` to `key`, replacing any existing object.
    fn put(&self, local_path: &Path, key: &str) -> ReelResult<()>;
}

/// [`ObjectStore`] backed by a local directory tree. Keys map to paths under
/// the root, with prefixes as subdirectories.
#[derive(Clone, Debug)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created if missing.
    pub fn new(root: impl Into<PathBuf>) -> ReelResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| {
            ReelError::storage(format!(
                "failed to create store root '{}': {e}",
                root.display()
            ))
        })?;
        Ok(Self { root })
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

impl ObjectStore for FsObjectStore {
    fn list(&self, prefix: &str) -> ReelResult<Vec<String>> {
        let dir = self.root.join(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| {
            ReelError::storage(format!("failed to list '{}': {e}", dir.display()))
        })?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                ReelError::storage(format!("failed to list '{}': {e}", dir.display()))
            })?;
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false)
                && let Some(name) = entry.file_name().to_str()
            {
                keys.push(format!("{prefix}/{name}"));
            }
        }
        Ok(keys)
    }

    fn get(&self, key: &str, local_path: &Path) -> ReelResult<()> {
        let src = self.key_path(key);
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReelError::storage(format!(
                    "failed to create '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        std::fs::copy(&src, local_path).map_err(|e| {
            ReelError::storage(format!("failed to get '{key}': {e}"))
        })?;
        Ok(())
    }

    fn put(&self, local_path: &Path, key: &str) -> ReelResult<()> {
        let dst = self.key_path(key);
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ReelError::storage(format!(
                    "failed to create '{}': {e}",
                    parent.display()
                ))
            })?;
        }
        std::fs::copy(local_path, &dst).map_err(|e| {
            ReelError::storage(format!("failed to put '{key}': {e}"))
        })?;
        Ok(())
    }
}

/// Return the `name` part of a `prefix/name` key.
pub fn key_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Return the file stem of a key's name (`voices/a.mp3` -> `a`).
pub fn key_stem(key: &str) -> &str {
    let name = key_name(key);
    name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name)
}
