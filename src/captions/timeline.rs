//! Caption cue timelines built from transcript items.

use crate::captions::transcript::TranscriptItem;
use crate::foundation::error::{ReelError, ReelResult};

/// One word-level caption cue on the fragment timeline.
#[derive(Clone, Debug, PartialEq)]
pub struct CaptionCue {
    /// Cue start in seconds, fragment-local.
    pub start: f64,
    /// Cue end in seconds, fragment-local.
    pub end: f64,
    /// The spoken word.
    pub text: String,
}

/// Build the cue timeline from transcript items, shifting every timestamp by
/// `offset` seconds.
///
/// Untimed items (punctuation) and items without a reading are dropped with a
/// warning. Items whose timing runs backwards relative to the previous cue
/// indicate a corrupt transcript and fail the build; an empty result fails
/// too, since a caption pass over zero cues would silently produce captionless
/// output.
pub fn build_cues(items: &[TranscriptItem], offset: f64) -> ReelResult<Vec<CaptionCue>> {
    let mut cues: Vec<CaptionCue> = Vec::with_capacity(items.len());
    for item in items {
        let Some((start, end)) = item.timing() else {
            continue;
        };
        let Some(word) = item.word() else {
            tracing::warn!(start, end, "dropping timed transcript item without a reading");
            continue;
        };
        if end < start {
            return Err(ReelError::caption(format!(
                "cue '{word}' ends before it starts ({start}..{end})"
            )));
        }
        if let Some(prev) = cues.last()
            && start < prev.start
        {
            return Err(ReelError::caption(format!(
                "cue '{word}' at {start}s starts before previous cue at {}s",
                prev.start
            )));
        }
        cues.push(CaptionCue {
            start: start + offset,
            end: end + offset,
            text: word.to_owned(),
        });
    }
    if cues.is_empty() {
        return Err(ReelError::transcription(
            "transcript contains no timed words",
        ));
    }
    Ok(cues)
}

/// Find the cue active at time `t`, using millisecond resolution with
/// half-open cue intervals `[start, end)`.
pub fn active_cue(cues: &[CaptionCue], t: f64) -> Option<&CaptionCue> {
    let t_ms = (t * 1000.0).round() as i64;
    cues.iter().find(|c| {
        let start_ms = (c.start * 1000.0).round() as i64;
        let end_ms = (c.end * 1000.0).round() as i64;
        start_ms <= t_ms && t_ms < end_ms
    })
}
