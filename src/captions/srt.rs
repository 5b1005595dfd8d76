//! SRT subtitle export for cue timelines.

use crate::captions::timeline::CaptionCue;
use crate::foundation::error::{ReelError, ReelResult};
use std::io::Write;

/// Format seconds as an SRT timestamp, `HH:MM:SS,mmm`.
pub fn format_srt_timestamp(secs: f64) -> String {
    let total_ms = (secs.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let s = (total_ms / 1000) % 60;
    let m = (total_ms / 60_000) % 60;
    let h = total_ms / 3_600_000;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

/// Write cues as an SRT document: 1-based counter, timestamp range, text,
/// blank separator.
pub fn write_srt(cues: &[CaptionCue], mut out: impl Write) -> ReelResult<()> {
    for (i, cue) in cues.iter().enumerate() {
        writeln!(
            out,
            "{}\n{} --> {}\n{}\n",
            i + 1,
            format_srt_timestamp(cue.start),
            format_srt_timestamp(cue.end),
            cue.text
        )
        .map_err(|e| ReelError::caption(format!("failed to write SRT: {e}")))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_carry_into_hours() {
        assert_eq!(format_srt_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_srt_timestamp(1.5), "00:00:01,500");
        assert_eq!(format_srt_timestamp(61.25), "00:01:01,250");
        assert_eq!(format_srt_timestamp(3661.007), "01:01:01,007");
    }

    #[test]
    fn srt_blocks_are_numbered_and_separated() {
        let cues = vec![
            CaptionCue {
                start: 0.1,
                end: 0.5,
                text: "one".to_owned(),
            },
            CaptionCue {
                start: 0.6,
                end: 1.0,
                text: "two".to_owned(),
            },
        ];
        let mut buf = Vec::new();
        write_srt(&cues, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "1\n00:00:00,100 --> 00:00:00,500\none\n\n2\n00:00:00,600 --> 00:00:01,000\ntwo\n\n"
        );
    }
}
