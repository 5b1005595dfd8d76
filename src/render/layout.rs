//! Pure caption layout: two-line greedy wrap and highlight sweep timing.
//!
//! Everything here works on pre-measured word widths so it can be unit tested
//! without fonts.

/// One word placed on the caption band.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct LaidWord {
    /// Word text.
    pub text: String,
    /// Measured pixel width.
    pub width: f32,
    /// Left edge in frame coordinates.
    pub x: f32,
    /// Line index, 0 (upper) or 1 (lower).
    pub line: usize,
}

/// Greedily wrap `words` (text plus measured width) onto two centered lines.
///
/// Each line's rendered width must fit within `frame_width * safe_ratio`;
/// words are packed onto line 0 until the next word would overflow, then onto
/// line 1 the same way. Words that fit neither line are dropped with a
/// warning rather than overflowing. Very long single words and more than two
/// lines' worth of text are not supported.
pub(crate) fn layout_two_lines(
    words: &[(String, f32)],
    frame_width: f32,
    safe_ratio: f32,
    gap: f32,
) -> Vec<LaidWord> {
    let max_line_width = frame_width * safe_ratio;
    let mut lines: [Vec<(String, f32)>; 2] = [Vec::new(), Vec::new()];
    let mut line_widths = [0.0f32; 2];
    let mut line = 0usize;

    for (text, width) in words {
        loop {
            let candidate = if lines[line].is_empty() {
                *width
            } else {
                line_widths[line] + gap + *width
            };
            if candidate <= max_line_width || lines[line].is_empty() && *width > max_line_width {
                if *width > max_line_width {
                    tracing::warn!(word = %text, "dropping word too wide for the caption band");
                    break;
                }
                lines[line].push((text.clone(), *width));
                line_widths[line] = candidate;
                break;
            }
            if line == 1 {
                tracing::warn!(word = %text, "dropping word beyond two caption lines");
                break;
            }
            line += 1;
        }
    }

    let mut out = Vec::new();
    for (line_idx, line_words) in lines.iter().enumerate() {
        if line_words.is_empty() {
            continue;
        }
        let mut x = (frame_width - line_widths[line_idx]) / 2.0;
        for (text, width) in line_words {
            out.push(LaidWord {
                text: text.clone(),
                width: *width,
                x,
                line: line_idx,
            });
            x += width + gap;
        }
    }
    out
}

/// Highlight sweep: which word (counting across both lines) is emphasized at
/// time `t`. The sweep cycles every `period` seconds regardless of how long
/// the cue is displayed; it is deliberately not synchronized to per-word
/// speech timing.
pub(crate) fn highlight_index(t: f64, total_words: usize, period: f64) -> usize {
    if total_words == 0 {
        return 0;
    }
    let elapsed_ratio = (t.rem_euclid(period)) / period;
    let idx = (elapsed_ratio * total_words as f64).floor() as usize;
    idx.min(total_words - 1)
}
