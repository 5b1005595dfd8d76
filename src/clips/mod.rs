//! Clip utilities outside the fragment loop: fixed-length segmenting,
//! seeded shuffling, and intro/outro bumpers.

use crate::foundation::core::{Canvas, TimeSpan};
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::MediaEngine;
use crate::store::{self, ObjectStore};
use std::path::Path;

/// Cut `local_video` into consecutive `segment_duration`-second segments and
/// upload them as `segments/segment_<start>_<end>.mp4`. Returns the uploaded
/// keys in timeline order.
pub fn slice_segments(
    engine: &dyn MediaEngine,
    store: &dyn ObjectStore,
    local_video: &Path,
    segment_duration: f64,
    target: Canvas,
    scratch_dir: &Path,
) -> ReelResult<Vec<String>> {
    if !(segment_duration.is_finite() && segment_duration > 0.0) {
        return Err(ReelError::validation(
            "segment_duration must be positive and finite",
        ));
    }
    let info = engine.probe(local_video)?;

    let mut keys = Vec::new();
    let mut start = 0.0f64;
    while start < info.duration_secs {
        let end = (start + segment_duration).min(info.duration_secs);
        let span = TimeSpan::new(start, end)?;
        let name = format!("segment_{}_{}.mp4", start as u64, end.ceil() as u64);
        let local = scratch_dir.join(&name);
        engine.transcode_slice(local_video, span, target, &local)?;

        let key = format!("{}/{name}", store::prefix::SEGMENTS);
        store.put(&local, &key)?;
        if let Err(e) = std::fs::remove_file(&local) {
            tracing::warn!(path = %local.display(), error = %e, "failed to remove segment");
        }
        keys.push(key);
        start = end;
    }
    tracing::info!(segments = keys.len(), "sliced video into segments");
    Ok(keys)
}

/// Shuffle the segments under `segments/` with a seeded permutation,
/// concatenate them, and upload the result as
/// `randomized/randomized_<seed>.mp4`. Returns the uploaded key.
pub fn randomize(
    engine: &dyn MediaEngine,
    store: &dyn ObjectStore,
    seed: u64,
    scratch_dir: &Path,
) -> ReelResult<String> {
    let mut keys = store.list(store::prefix::SEGMENTS)?;
    keys.sort();
    if keys.is_empty() {
        return Err(ReelError::validation("no segments found under segments/"));
    }

    shuffle(&mut keys, seed);

    let mut locals = Vec::new();
    for key in &keys {
        let local = scratch_dir.join(store::key_name(key));
        if !local.exists() {
            store.get(key, &local)?;
        }
        locals.push(local);
    }
    let local_refs: Vec<&Path> = locals.iter().map(|p| p.as_path()).collect();

    let name = format!("randomized_{seed}.mp4");
    let out = scratch_dir.join(&name);
    engine.concat(&local_refs, &out)?;

    let out_key = format!("{}/{name}", store::prefix::RANDOMIZED);
    store.put(&out, &out_key)?;
    if let Err(e) = std::fs::remove_file(&out) {
        tracing::warn!(path = %out.display(), error = %e, "failed to remove concat output");
    }
    tracing::info!(seed, segments = keys.len(), "randomized segments");
    Ok(out_key)
}

/// Attach intro/outro bumpers to every video under `video-to-mix/` and
/// upload the results as `processed/processed_<name>`. Returns the uploaded
/// keys.
pub fn add_bumpers(
    engine: &dyn MediaEngine,
    store: &dyn ObjectStore,
    intro_key: &str,
    outro_key: &str,
    scratch_dir: &Path,
) -> ReelResult<Vec<String>> {
    let mut videos: Vec<String> = store
        .list(store::prefix::VIDEO_TO_MIX)?
        .into_iter()
        .filter(|k| k.ends_with(".mp4"))
        .collect();
    videos.sort();
    if videos.is_empty() {
        return Err(ReelError::validation(
            "no videos found under video-to-mix/",
        ));
    }

    let intro = scratch_dir.join(store::key_name(intro_key));
    store.get(intro_key, &intro)?;
    let outro = scratch_dir.join(store::key_name(outro_key));
    store.get(outro_key, &outro)?;

    let mut out_keys = Vec::new();
    for video_key in &videos {
        let name = store::key_name(video_key);
        let local = scratch_dir.join(name);
        if !local.exists() {
            store.get(video_key, &local)?;
        }

        let out_name = format!("processed_{name}");
        let out = scratch_dir.join(&out_name);
        engine.concat(&[&intro, &local, &outro], &out)?;

        let key = format!("{}/{out_name}", store::prefix::PROCESSED);
        store.put(&out, &key)?;
        for p in [&local, &out] {
            if let Err(e) = std::fs::remove_file(p) {
                tracing::warn!(path = %p.display(), error = %e, "failed to remove scratch file");
            }
        }
        out_keys.push(key);
    }
    Ok(out_keys)
}

/// Seeded Fisher-Yates shuffle over a splitmix64 stream, so a given seed
/// always yields the same order.
fn shuffle<T>(items: &mut [T], seed: u64) {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    };
    for i in (1..items.len()).rev() {
        let j = (next() % (i as u64 + 1)) as usize;
        items.swap(i, j);
    }
}
