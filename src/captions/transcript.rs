//! Serde model for transcription job output documents.
//!
//! The document shape is `results.items[]`, where each item carries string
//! `start_time`/`end_time` fields in seconds and its recognized text in
//! `alternatives[0].content`. Punctuation items omit the timing fields.

use crate::foundation::error::{ReelError, ReelResult};
use serde::Deserialize;

/// Top-level transcript document.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptDoc {
    /// Recognition results.
    pub results: TranscriptResults,
}

/// The `results` object of a transcript document.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptResults {
    /// Recognized items in timeline order.
    pub items: Vec<TranscriptItem>,
}

/// One recognized item: a timed word or an untimed punctuation mark.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptItem {
    /// Start time in seconds, serialized as a decimal string.
    #[serde(default)]
    pub start_time: Option<String>,
    /// End time in seconds, serialized as a decimal string.
    #[serde(default)]
    pub end_time: Option<String>,
    /// Candidate readings; the first is the best.
    #[serde(default)]
    pub alternatives: Vec<TranscriptAlternative>,
}

/// One candidate reading of an item.
#[derive(Clone, Debug, Deserialize)]
pub struct TranscriptAlternative {
    /// Recognized text.
    pub content: String,
}

impl TranscriptItem {
    /// Parse the item's timing into `(start, end)` seconds. Returns `None`
    /// for untimed items (punctuation) and unparseable timestamps.
    pub fn timing(&self) -> Option<(f64, f64)> {
        let start = self.start_time.as_deref()?.parse::<f64>().ok()?;
        let end = self.end_time.as_deref()?.parse::<f64>().ok()?;
        Some((start, end))
    }

    /// The item's best reading, if any.
    pub fn word(&self) -> Option<&str> {
        self.alternatives.first().map(|a| a.content.as_str())
    }
}

/// Parse a transcript document from JSON bytes.
pub fn parse_transcript(bytes: &[u8]) -> ReelResult<TranscriptDoc> {
    serde_json::from_slice(bytes)
        .map_err(|e| ReelError::transcription(format!("failed to parse transcript JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "results": {
            "items": [
                {
                    "start_time": "0.14",
                    "end_time": "0.55",
                    "alternatives": [{"content": "hello"}]
                },
                {
                    "alternatives": [{"content": ","}]
                },
                {
                    "start_time": "0.60",
                    "end_time": "1.02",
                    "alternatives": [{"content": "world"}]
                }
            ]
        }
    }"#;

    #[test]
    fn parses_timed_and_untimed_items() {
        let doc = parse_transcript(SAMPLE.as_bytes()).unwrap();
        assert_eq!(doc.results.items.len(), 3);
        assert_eq!(doc.results.items[0].timing(), Some((0.14, 0.55)));
        assert_eq!(doc.results.items[0].word(), Some("hello"));
        assert_eq!(doc.results.items[1].timing(), None);
        assert_eq!(doc.results.items[1].word(), Some(","));
    }

    #[test]
    fn bad_timestamp_strings_yield_no_timing() {
        let item = TranscriptItem {
            start_time: Some("abc".to_owned()),
            end_time: Some("1.0".to_owned()),
            alternatives: vec![],
        };
        assert_eq!(item.timing(), None);
        assert_eq!(item.word(), None);
    }

    #[test]
    fn invalid_json_is_a_transcription_error() {
        let err = parse_transcript(b"{").unwrap_err();
        assert!(err.to_string().starts_with("transcription error"));
    }
}
