//! Word-level captions: transcript parsing, cue timelines, and SRT export.

mod srt;
mod timeline;
mod transcript;

pub use srt::{format_srt_timestamp, write_srt};
pub use timeline::{CaptionCue, active_cue, build_cues};
pub use transcript::{TranscriptDoc, TranscriptItem, parse_transcript};
