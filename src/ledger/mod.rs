//! Durable, append-only record of per-video fragment progress.
//!
//! Each line is `video_filename,fragment_index,status` with status `complete`
//! or `incomplete`. The file is never rewritten or compacted; when folding the
//! file into per-video progress the *last* record per video wins, so later
//! markers supersede earlier ones. The ledger entry is the durable source of
//! truth across process restarts — in-memory state is never trusted.

use crate::foundation::error::{ReelError, ReelResult};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Folded progress for one video.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoProgress {
    /// Highest fragment index persisted for the video.
    pub last_fragment: u32,
    /// Whether the video has been fully processed.
    pub complete: bool,
}

/// Append-only checkpoint ledger backed by a plain text file.
#[derive(Clone, Debug)]
pub struct CheckpointLedger {
    path: PathBuf,
}

impl CheckpointLedger {
    /// Create a ledger handle for `path`. The file is created lazily on the
    /// first [`CheckpointLedger::record`] call.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Ledger file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the ledger into per-video progress.
    ///
    /// A missing file yields an empty map. Malformed lines are skipped with a
    /// warning, never fatal; I/O errors are fatal.
    pub fn load(&self) -> ReelResult<BTreeMap<String, VideoProgress>> {
        let mut progress = BTreeMap::new();
        if !self.path.exists() {
            return Ok(progress);
        }

        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ReelError::ledger(format!(
                "failed to read ledger '{}': {e}",
                self.path.display()
            ))
        })?;

        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((video, last_fragment, complete)) = parse_line(line) else {
                tracing::warn!(line, "skipping malformed ledger line");
                continue;
            };
            // Last record per video wins.
            progress.insert(
                video,
                VideoProgress {
                    last_fragment,
                    complete,
                },
            );
        }
        Ok(progress)
    }

    /// Append one record and flush it to durable storage.
    pub fn record(&self, video: &str, fragment_index: u32, complete: bool) -> ReelResult<()> {
        let status = if complete { "complete" } else { "incomplete" };
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ReelError::ledger(format!(
                    "failed to open ledger '{}' for append: {e}",
                    self.path.display()
                ))
            })?;
        writeln!(file, "{video},{fragment_index},{status}")
            .and_then(|_| file.sync_data())
            .map_err(|e| {
                ReelError::ledger(format!(
                    "failed to append to ledger '{}': {e}",
                    self.path.display()
                ))
            })
    }

    /// Rebuild the ledger from uploaded fragment keys (e.g. a `reels/` store
    /// listing), writing one `incomplete` record per video at its highest
    /// observed fragment index. Returns the number of videos recorded.
    ///
    /// Fragment keys follow the upload contract `fragment_<index>_<video>`;
    /// keys that do not match are ignored.
    pub fn rebuild_from_keys<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> ReelResult<usize> {
        let mut highest = BTreeMap::<String, u32>::new();
        for key in keys {
            let name = key.rsplit('/').next().unwrap_or(key);
            let Some((index, video)) = parse_fragment_name(name) else {
                continue;
            };
            highest
                .entry(video.to_owned())
                .and_modify(|v| *v = (*v).max(index))
                .or_insert(index);
        }

        let mut out = String::new();
        for (video, index) in &highest {
            out.push_str(&format!("{video},{index},incomplete\n"));
        }
        std::fs::write(&self.path, out).map_err(|e| {
            ReelError::ledger(format!(
                "failed to write rebuilt ledger '{}': {e}",
                self.path.display()
            ))
        })?;
        tracing::info!(videos = highest.len(), "rebuilt ledger from fragment keys");
        Ok(highest.len())
    }
}

/// Compute where processing resumes for a video: `(start_offset, fragment_index)`.
pub fn resume_point(progress: Option<&VideoProgress>, fragment_duration: f64) -> (f64, u32) {
    let last = progress.map(|p| p.last_fragment).unwrap_or(0);
    (f64::from(last) * fragment_duration, last + 1)
}

fn parse_line(line: &str) -> Option<(String, u32, bool)> {
    let mut parts = line.splitn(3, ',');
    let video = parts.next()?.trim();
    let index = parts.next()?.trim().parse::<u32>().ok()?;
    let status = parts.next()?.trim();
    if video.is_empty() {
        return None;
    }
    Some((video.to_owned(), index, status == "complete"))
}

/// Parse `fragment_<index>_<video>` into `(index, video)`.
pub(crate) fn parse_fragment_name(name: &str) -> Option<(u32, &str)> {
    let rest = name.strip_prefix("fragment_")?;
    let (index, video) = rest.split_once('_')?;
    let index = index.parse::<u32>().ok()?;
    if video.is_empty() {
        return None;
    }
    Some((index, video))
}
