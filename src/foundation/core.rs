use crate::foundation::error::{ReelError, ReelResult};

/// Absolute 0-based frame index in fragment timeline space.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> ReelResult<Self> {
        if den == 0 {
            return Err(ReelError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(ReelError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in seconds.
    pub fn frame_duration_secs(self) -> f64 {
        f64::from(self.den) / f64::from(self.num)
    }

    /// Convert frame count to seconds.
    pub fn frames_to_secs(self, frames: u64) -> f64 {
        (frames as f64) * self.frame_duration_secs()
    }

    /// Convert seconds to frame count, rounding to the nearest frame.
    pub fn secs_to_frames_round(self, secs: f64) -> u64 {
        (secs * self.as_f64()).round().max(0.0) as u64
    }
}

/// Output canvas dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Half-open time span `[start, end)` in seconds on a media timeline.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TimeSpan {
    /// Inclusive span start in seconds.
    pub start: f64,
    /// Exclusive span end in seconds.
    pub end: f64,
}

impl TimeSpan {
    /// Create a validated span with finite bounds and `start <= end`.
    pub fn new(start: f64, end: f64) -> ReelResult<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(ReelError::validation("TimeSpan bounds must be finite"));
        }
        if start < 0.0 {
            return Err(ReelError::validation("TimeSpan start must be >= 0"));
        }
        if start > end {
            return Err(ReelError::validation("TimeSpan start must be <= end"));
        }
        Ok(Self { start, end })
    }

    /// Span length in seconds.
    pub fn duration(self) -> f64 {
        self.end - self.start
    }

    /// Return `true` when the span has zero length.
    pub fn is_empty(self) -> bool {
        self.duration() <= 0.0
    }
}

/// A decoded frame as straight-alpha RGBA8 pixels.
///
/// Video frames flowing through the pipeline are opaque; the caption renderer
/// composites premultiplied overlays onto them in place.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameRGBA {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed, row-major.
    pub data: Vec<u8>,
}

impl FrameRGBA {
    /// Allocate an opaque frame filled with `rgb`.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut data = vec![255u8; (width as usize) * (height as usize) * 4];
        for px in data.chunks_exact_mut(4) {
            px[0] = rgb[0];
            px[1] = rgb[1];
            px[2] = rgb[2];
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Expected byte length for the frame dimensions.
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }

    /// Validate that the pixel buffer matches the dimensions.
    pub fn validate(&self) -> ReelResult<()> {
        if self.data.len() != self.expected_len() {
            return Err(ReelError::validation(format!(
                "frame buffer is {} bytes, expected {} for {}x{}",
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }
}
