/// Convenience result type used across Reelsmith.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error taxonomy used by pipeline APIs.
#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    /// Invalid user-provided options or data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Checkpoint ledger I/O failures. Fatal for a run: without durable
    /// progress tracking the pipeline would risk double work.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// Object store list/get/put failures.
    #[error("storage error: {0}")]
    Storage(String),

    /// Media probe/decode/encode failures (ffmpeg/ffprobe).
    #[error("media error: {0}")]
    Media(String),

    /// Transcription job failures, timeouts, and empty transcripts.
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Caption cue construction and layout failures.
    #[error("caption error: {0}")]
    Caption(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    /// Build a [`ReelError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ReelError::Ledger`] value.
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Build a [`ReelError::Storage`] value.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Build a [`ReelError::Media`] value.
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media(msg.into())
    }

    /// Build a [`ReelError::Transcription`] value.
    pub fn transcription(msg: impl Into<String>) -> Self {
        Self::Transcription(msg.into())
    }

    /// Build a [`ReelError::Caption`] value.
    pub fn caption(msg: impl Into<String>) -> Self {
        Self::Caption(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_taxonomy_prefix() {
        let e = ReelError::ledger("bad line");
        assert_eq!(e.to_string(), "ledger error: bad line");
        let e = ReelError::transcription("job failed");
        assert_eq!(e.to_string(), "transcription error: job failed");
    }

    #[test]
    fn anyhow_errors_wrap_transparently() {
        let inner = anyhow::anyhow!("boom");
        let e = ReelError::from(inner);
        assert_eq!(e.to_string(), "boom");
    }
}
