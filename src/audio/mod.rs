//! Fragment audio composition.
//!
//! Mixing happens outside the per-frame render loop: the composed track is
//! written as raw `f32le` PCM and handed to the encoder sink as a separate
//! input. A fragment track is voiceover at full level over background music
//! ducked to [`MUSIC_GAIN`], optionally preceded by a hook block carrying its
//! own audio.

use crate::foundation::error::{ReelError, ReelResult};
use crate::media::AudioPcm;
use std::path::Path;

/// Gain applied to background music so it sits under the voiceover.
pub const MUSIC_GAIN: f32 = 0.25;

/// One source layer of a fragment mix.
#[derive(Clone, Debug)]
pub struct AudioLayer {
    /// Decoded source PCM.
    pub pcm: AudioPcm,
    /// Linear gain applied while mixing.
    pub gain: f32,
}

/// Audio for a hook block prepended to the fragment.
#[derive(Clone, Debug)]
pub struct HookAudio {
    /// The hook clip's own audio track.
    pub voice: AudioLayer,
    /// Music layered under the hook, if any.
    pub music: Option<AudioLayer>,
    /// Hook block length in seconds.
    pub duration_secs: f64,
}

/// Compose the full audio track for one fragment.
///
/// The output is stereo at `sample_rate` and exactly
/// `round((hook + fragment_duration) * sample_rate)` sample frames long, so
/// audio and video streams stay aligned regardless of source lengths. Voice
/// is subclipped by the caller and padded with silence here, never looped;
/// music restarts from its beginning and loops to fill the block. Samples are
/// clamped to `[-1, 1]` after summing.
pub fn compose(
    voice: Option<&AudioLayer>,
    music: &AudioLayer,
    hook: Option<&HookAudio>,
    fragment_duration: f64,
    sample_rate: u32,
) -> ReelResult<AudioPcm> {
    if sample_rate == 0 {
        return Err(ReelError::validation("sample_rate must be non-zero"));
    }
    if !(fragment_duration.is_finite() && fragment_duration > 0.0) {
        return Err(ReelError::validation(
            "fragment_duration must be positive and finite",
        ));
    }

    let hook_frames = match hook {
        Some(h) => secs_to_frames(h.duration_secs, sample_rate),
        None => 0,
    };
    let body_frames = secs_to_frames(fragment_duration, sample_rate);
    let total_frames = hook_frames + body_frames;
    let mut out = vec![0.0f32; total_frames * 2];

    if let Some(h) = hook {
        let block = &mut out[..hook_frames * 2];
        mix_padded(block, &h.voice)?;
        if let Some(music) = h.music.as_ref() {
            mix_looped(block, music)?;
        }
    }

    let body = &mut out[hook_frames * 2..];
    if let Some(voice) = voice {
        mix_padded(body, voice)?;
    }
    mix_looped(body, music)?;

    for s in &mut out {
        *s = s.clamp(-1.0, 1.0);
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: out,
    })
}

/// Add `layer` into `out` without looping; anything past the source's end
/// stays silent.
fn mix_padded(out: &mut [f32], layer: &AudioLayer) -> ReelResult<()> {
    let src_frames = source_frames(&layer.pcm)?;
    if src_frames == 0 {
        return Ok(());
    }
    let out_frames = out.len() / 2;
    for frame in 0..out_frames.min(src_frames) {
        let (l, r) = source_frame(&layer.pcm, frame);
        out[frame * 2] += l * layer.gain;
        out[frame * 2 + 1] += r * layer.gain;
    }
    Ok(())
}

/// Add `layer` into `out`, restarting from the source's beginning whenever it
/// runs out.
fn mix_looped(out: &mut [f32], layer: &AudioLayer) -> ReelResult<()> {
    let src_frames = source_frames(&layer.pcm)?;
    if src_frames == 0 {
        return Ok(());
    }
    let out_frames = out.len() / 2;
    for frame in 0..out_frames {
        let (l, r) = source_frame(&layer.pcm, frame % src_frames);
        out[frame * 2] += l * layer.gain;
        out[frame * 2 + 1] += r * layer.gain;
    }
    Ok(())
}

fn source_frames(pcm: &AudioPcm) -> ReelResult<usize> {
    match pcm.channels {
        1 | 2 => Ok(pcm.frame_count()),
        n => Err(ReelError::validation(format!(
            "mixer supports mono and stereo sources, got {n} channels"
        ))),
    }
}

fn source_frame(pcm: &AudioPcm, frame: usize) -> (f32, f32) {
    if pcm.channels == 1 {
        let v = pcm.interleaved_f32[frame];
        (v, v)
    } else {
        (
            pcm.interleaved_f32[frame * 2],
            pcm.interleaved_f32[frame * 2 + 1],
        )
    }
}

fn secs_to_frames(secs: f64, sample_rate: u32) -> usize {
    (secs * f64::from(sample_rate)).round().max(0.0) as usize
}

/// Write interleaved `f32` PCM samples to a raw little-endian `.f32le` file.
pub fn write_pcm_f32le(samples_interleaved: &[f32], out_path: &Path) -> ReelResult<()> {
    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            ReelError::media(format!(
                "failed to create audio output directory '{}': {e}",
                parent.display()
            ))
        })?;
    }
    let mut bytes = Vec::<u8>::with_capacity(samples_interleaved.len() * 4);
    for &sample in samples_interleaved {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    std::fs::write(out_path, bytes).map_err(|e| {
        ReelError::media(format!(
            "failed to write audio file '{}': {e}",
            out_path.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stereo(frames: usize, value: f32) -> AudioPcm {
        AudioPcm {
            sample_rate: 100,
            channels: 2,
            interleaved_f32: vec![value; frames * 2],
        }
    }

    fn mono(samples: Vec<f32>) -> AudioPcm {
        AudioPcm {
            sample_rate: 100,
            channels: 1,
            interleaved_f32: samples,
        }
    }

    #[test]
    fn output_length_is_exact_for_duration() {
        let music = AudioLayer {
            pcm: stereo(10, 0.5),
            gain: MUSIC_GAIN,
        };
        let out = compose(None, &music, None, 2.5, 100).unwrap();
        assert_eq!(out.frame_count(), 250);
        assert_eq!(out.channels, 2);
    }

    #[test]
    fn voice_is_padded_and_music_is_looped() {
        let voice = AudioLayer {
            pcm: stereo(50, 0.8),
            gain: 1.0,
        };
        let music = AudioLayer {
            pcm: stereo(30, 0.4),
            gain: MUSIC_GAIN,
        };
        let out = compose(Some(&voice), &music, None, 1.0, 100).unwrap();
        assert_eq!(out.frame_count(), 100);

        // Within voice: voice + ducked music.
        let expected_mixed = 0.8 + 0.4 * MUSIC_GAIN;
        assert!((out.interleaved_f32[0] - expected_mixed).abs() < 1e-6);
        // Past the voice's end only looped music remains.
        let expected_tail = 0.4 * MUSIC_GAIN;
        assert!((out.interleaved_f32[99 * 2] - expected_tail).abs() < 1e-6);
    }

    #[test]
    fn mono_sources_mix_into_both_channels() {
        let music = AudioLayer {
            pcm: mono(vec![0.5; 10]),
            gain: 1.0,
        };
        let out = compose(None, &music, None, 0.1, 100).unwrap();
        assert!((out.interleaved_f32[0] - 0.5).abs() < 1e-6);
        assert!((out.interleaved_f32[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn hook_block_precedes_the_fragment_body() {
        let hook = HookAudio {
            voice: AudioLayer {
                pcm: stereo(20, 0.9),
                gain: 1.0,
            },
            music: None,
            duration_secs: 0.2,
        };
        let music = AudioLayer {
            pcm: stereo(10, 0.4),
            gain: MUSIC_GAIN,
        };
        let out = compose(None, &music, Some(&hook), 0.5, 100).unwrap();
        assert_eq!(out.frame_count(), 70);
        // Hook block carries the hook's own audio, no fragment music.
        assert!((out.interleaved_f32[0] - 0.9).abs() < 1e-6);
        // Body starts after the hook and carries the ducked music.
        assert!((out.interleaved_f32[20 * 2] - 0.4 * MUSIC_GAIN).abs() < 1e-6);
    }

    #[test]
    fn samples_clamp_after_summing() {
        let voice = AudioLayer {
            pcm: stereo(10, 1.0),
            gain: 1.0,
        };
        let music = AudioLayer {
            pcm: stereo(10, 1.0),
            gain: 1.0,
        };
        let out = compose(Some(&voice), &music, None, 0.1, 100).unwrap();
        assert!(out.interleaved_f32.iter().all(|s| *s <= 1.0));
    }

    #[test]
    fn empty_music_yields_silence_not_error() {
        let music = AudioLayer {
            pcm: stereo(0, 0.0),
            gain: MUSIC_GAIN,
        };
        let out = compose(None, &music, None, 0.1, 100).unwrap();
        assert!(out.interleaved_f32.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn pcm_round_trips_through_f32le_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mix.f32le");
        write_pcm_f32le(&[0.25, -0.5, 1.0], &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(f32::from_le_bytes(bytes[0..4].try_into().unwrap()), 0.25);
        assert_eq!(f32::from_le_bytes(bytes[4..8].try_into().unwrap()), -0.5);
    }
}
