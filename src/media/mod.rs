//! Media engine port: probing, decoding, and encoding through ffmpeg.
//!
//! The pipeline drives all media work through [`MediaEngine`], which keeps
//! the ffmpeg process plumbing behind one seam. [`ffmpeg::FfmpegEngine`] is
//! the production implementation; tests substitute fakes.

pub mod ffmpeg;
mod sink;

pub use sink::{AudioInputConfig, FrameSink, InMemorySink, SinkConfig};

use crate::foundation::core::{Canvas, Fps, FrameRGBA, TimeSpan};
use crate::foundation::error::ReelResult;
use std::path::Path;

/// Internal audio mixing sample rate used across decode/mix/encode.
pub const MIX_SAMPLE_RATE: u32 = 48_000;

/// Basic metadata about a media file.
#[derive(Clone, Debug)]
pub struct MediaInfo {
    /// Container duration in seconds.
    pub duration_secs: f64,
    /// Video width in pixels, zero for audio-only files.
    pub width: u32,
    /// Video height in pixels, zero for audio-only files.
    pub height: u32,
    /// Video frame rate; meaningless for audio-only files.
    pub fps: Fps,
    /// Whether at least one audio stream is present.
    pub has_audio: bool,
}

/// Decoded interleaved floating-point PCM.
#[derive(Clone, Debug)]
pub struct AudioPcm {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Interleaved `f32` PCM samples.
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Sample frames in the buffer (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.interleaved_f32.len() / self.channels as usize
    }
}

/// Streaming source of decoded frames in timeline order.
pub trait FrameSource {
    /// The dimensions every produced frame has.
    fn canvas(&self) -> Canvas;

    /// Decode the next frame, or `None` once the stream is exhausted.
    fn next_frame(&mut self) -> ReelResult<Option<FrameRGBA>>;
}

/// Media operations seam. All paths are local; store transfer is the
/// caller's concern.
pub trait MediaEngine {
    /// Probe metadata for a media file.
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo>;

    /// Decode audio (optionally a sub-span) as stereo interleaved `f32` PCM
    /// at `sample_rate`. Files without an audio stream yield empty PCM.
    fn decode_audio(
        &self,
        path: &Path,
        span: Option<TimeSpan>,
        sample_rate: u32,
    ) -> ReelResult<AudioPcm>;

    /// Open a streaming decoder for `span` of the video at `path`, scaled to
    /// `target` and resampled to `fps`.
    fn frame_source(
        &self,
        path: &Path,
        span: TimeSpan,
        target: Canvas,
        fps: Fps,
    ) -> ReelResult<Box<dyn FrameSource>>;

    /// Open an MP4 encoder sink writing to `out_path`.
    fn frame_sink(&self, out_path: &Path) -> ReelResult<Box<dyn FrameSink>>;

    /// Re-encode `span` of `input` to `out_path`, scaled to `target`.
    fn transcode_slice(
        &self,
        input: &Path,
        span: TimeSpan,
        target: Canvas,
        out_path: &Path,
    ) -> ReelResult<()>;

    /// Concatenate same-format inputs into `out_path`.
    fn concat(&self, inputs: &[&Path], out_path: &Path) -> ReelResult<()>;

    /// Extract `span` of the audio track of `input` to a WAV at `out_path`.
    fn extract_audio_slice(&self, input: &Path, span: TimeSpan, out_path: &Path)
    -> ReelResult<()>;
}
