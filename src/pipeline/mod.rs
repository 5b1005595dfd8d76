//! The resumable fragment pipeline.
//!
//! One run walks every source video under `video-to-mix/`, slices it into
//! fixed-length fragments, composes the layered audio track, optionally burns
//! word-level captions, encodes, and uploads each fragment to `reels/`. The
//! checkpoint ledger is consulted before any work and appended after every
//! fragment, so a crashed or interrupted run resumes at the fragment after
//! the last one recorded.

use crate::audio::{AudioLayer, HookAudio, MUSIC_GAIN, compose, write_pcm_f32le};
use crate::captions::{CaptionCue, build_cues, parse_transcript, write_srt};
use crate::foundation::core::{Canvas, Fps, FrameIndex, TimeSpan};
use crate::foundation::error::{ReelError, ReelResult};
use crate::ledger::{CheckpointLedger, VideoProgress, resume_point};
use crate::media::{AudioInputConfig, MIX_SAMPLE_RATE, MediaEngine, SinkConfig};
use crate::render::CaptionOverlay;
use crate::store::{self, ObjectStore};
use crate::transcribe::{PollOpts, TranscriptionService, wait_for_transcript};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Per-fragment processing stage, used for structured progress logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentState {
    Pending,
    Downloading,
    Slicing,
    ComposingAudio,
    Transcribing,
    CaptionBuilding,
    Rendering,
    Encoding,
    Uploading,
    Complete,
}

impl FragmentState {
    /// All stages, in processing order.
    pub const ALL: [FragmentState; 10] = [
        Self::Pending,
        Self::Downloading,
        Self::Slicing,
        Self::ComposingAudio,
        Self::Transcribing,
        Self::CaptionBuilding,
        Self::Rendering,
        Self::Encoding,
        Self::Uploading,
        Self::Complete,
    ];

    /// Stable lowercase name for log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Downloading => "downloading",
            Self::Slicing => "slicing",
            Self::ComposingAudio => "composing_audio",
            Self::Transcribing => "transcribing",
            Self::CaptionBuilding => "caption_building",
            Self::Rendering => "rendering",
            Self::Encoding => "encoding",
            Self::Uploading => "uploading",
            Self::Complete => "complete",
        }
    }
}

/// Run-wide pipeline options.
#[derive(Clone, Debug)]
pub struct PipelineOpts {
    /// Length of one fragment in seconds.
    pub fragment_duration: f64,
    /// Local working directory for downloads and intermediates.
    pub scratch_dir: PathBuf,
    /// Checkpoint ledger file path.
    pub ledger_path: PathBuf,
    /// Transcription language hint (BCP-47).
    pub language: String,
    /// Transcription polling cadence and deadline.
    pub poll: PollOpts,
    /// Output canvas.
    pub canvas: Canvas,
    /// Output frame rate.
    pub fps: Fps,
    /// Whether to transcribe and burn captions.
    pub captions: bool,
    /// Whether to prepend hook clips.
    pub hooks: bool,
    /// Audio mixing sample rate.
    pub sample_rate: u32,
}

impl PipelineOpts {
    /// Stock reel options rooted at `scratch_dir`, with the ledger at
    /// `ledger_path`.
    pub fn new(scratch_dir: impl Into<PathBuf>, ledger_path: impl Into<PathBuf>) -> Self {
        Self {
            fragment_duration: 90.0,
            scratch_dir: scratch_dir.into(),
            ledger_path: ledger_path.into(),
            language: "en-US".to_owned(),
            poll: PollOpts::default(),
            canvas: Canvas {
                width: 720,
                height: 1080,
            },
            fps: Fps { num: 30, den: 1 },
            captions: true,
            hooks: false,
            sample_rate: MIX_SAMPLE_RATE,
        }
    }

    fn validate(&self) -> ReelResult<()> {
        if !(self.fragment_duration.is_finite() && self.fragment_duration > 0.0) {
            return Err(ReelError::validation(
                "fragment_duration must be positive and finite",
            ));
        }
        if self.sample_rate == 0 {
            return Err(ReelError::validation("sample_rate must be non-zero"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(ReelError::validation("canvas must be non-zero"));
        }
        Ok(())
    }
}

/// Counters for one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Videos fully processed this run.
    pub videos_processed: usize,
    /// Videos skipped because the ledger already marks them complete.
    pub videos_skipped: usize,
    /// Videos that failed and were left incomplete.
    pub videos_failed: usize,
    /// Fragments rendered and uploaded this run.
    pub fragments_rendered: usize,
}

/// The fragment pipeline over its ports.
pub struct FragmentPipeline<'a> {
    store: &'a dyn ObjectStore,
    engine: &'a dyn MediaEngine,
    transcriber: &'a dyn TranscriptionService,
    overlay: Option<Box<dyn CaptionOverlay>>,
    opts: PipelineOpts,
}

impl fmt::Debug for FragmentPipeline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FragmentPipeline")
            .field("overlay", &self.overlay.is_some())
            .field("opts", &self.opts)
            .finish_non_exhaustive()
    }
}

impl<'a> FragmentPipeline<'a> {
    /// Assemble a pipeline. `overlay` is required when `opts.captions` is set.
    pub fn new(
        store: &'a dyn ObjectStore,
        engine: &'a dyn MediaEngine,
        transcriber: &'a dyn TranscriptionService,
        overlay: Option<Box<dyn CaptionOverlay>>,
        opts: PipelineOpts,
    ) -> ReelResult<Self> {
        opts.validate()?;
        if opts.captions && overlay.is_none() {
            return Err(ReelError::validation(
                "captions are enabled but no caption overlay was provided",
            ));
        }
        Ok(Self {
            store,
            engine,
            transcriber,
            overlay,
            opts,
        })
    }

    /// Process every pending video. Per-video failures are logged and
    /// recorded in the stats; they never abort the run.
    pub fn run(&mut self) -> ReelResult<RunStats> {
        let ledger = CheckpointLedger::new(&self.opts.ledger_path);
        let progress = ledger.load()?;

        let mut videos: Vec<String> = self
            .store
            .list(store::prefix::VIDEO_TO_MIX)?
            .into_iter()
            .filter(|k| k.ends_with(".mp4"))
            .collect();
        videos.sort();
        if videos.is_empty() {
            tracing::warn!("no videos found under video-to-mix/, nothing to do");
            return Ok(RunStats::default());
        }

        let voices = self.store.list(store::prefix::VOICES)?;
        let mut music: Vec<String> = self.store.list(store::prefix::BACKGROUND_MUSIC)?;
        music.sort();
        if music.is_empty() {
            return Err(ReelError::validation(
                "no background music found under background-music/",
            ));
        }
        let mut hooks: Vec<String> = if self.opts.hooks {
            self.store.list(store::prefix::HOOKS)?
        } else {
            Vec::new()
        };
        hooks.sort();

        std::fs::create_dir_all(&self.opts.scratch_dir).map_err(|e| {
            ReelError::validation(format!(
                "failed to create scratch dir '{}': {e}",
                self.opts.scratch_dir.display()
            ))
        })?;

        let mut stats = RunStats::default();
        for video_key in &videos {
            let name = store::key_name(video_key).to_owned();
            if let Some(p) = progress.get(&name)
                && p.complete
            {
                tracing::info!(video = %name, "already complete, skipping");
                stats.videos_skipped += 1;
                continue;
            }
            match self.process_video(&ledger, &progress, video_key, &voices, &music, &hooks) {
                Ok(fragments) => {
                    stats.videos_processed += 1;
                    stats.fragments_rendered += fragments;
                }
                Err(e) => {
                    tracing::error!(video = %name, error = %e, "video failed, leaving incomplete");
                    stats.videos_failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Process one video from its resume point to its end. Returns the
    /// number of fragments rendered.
    #[tracing::instrument(skip_all, fields(video = %store::key_name(video_key)))]
    fn process_video(
        &mut self,
        ledger: &CheckpointLedger,
        progress: &BTreeMap<String, VideoProgress>,
        video_key: &str,
        voices: &[String],
        music: &[String],
        hooks: &[String],
    ) -> ReelResult<usize> {
        let name = store::key_name(video_key).to_owned();
        let stem = store::key_stem(video_key).to_owned();

        let local_video = self.download_if_absent(video_key)?;
        let info = self.engine.probe(&local_video)?;
        let (start_offset, fragment_index) =
            resume_point(progress.get(&name), self.opts.fragment_duration);
        tracing::info!(
            duration = info.duration_secs,
            start_offset,
            fragment_index,
            "processing video"
        );

        // Voiceover is matched to the video by file stem.
        let voice_key = voices
            .iter()
            .find(|k| store::key_stem(k) == stem)
            .cloned();
        if self.opts.captions && voice_key.is_none() {
            return Err(ReelError::validation(format!(
                "captions are enabled but no voice track matches '{stem}'"
            )));
        }
        let local_voice = voice_key
            .as_deref()
            .map(|k| self.download_if_absent(k))
            .transpose()?;

        // The overlay is taken out for the loop so fragment processing can
        // borrow it mutably alongside the pipeline, and restored even when a
        // fragment fails.
        let mut aux_downloads = BTreeSet::new();
        let mut overlay = self.overlay.take();
        let result = self.render_fragments(
            ledger,
            &name,
            &stem,
            &local_video,
            local_voice.as_deref(),
            info.duration_secs,
            start_offset,
            fragment_index,
            music,
            hooks,
            overlay.as_deref_mut(),
            &mut aux_downloads,
        );
        self.overlay = overlay;
        let (rendered, next_index) = result?;
        ledger.record(&name, next_index.saturating_sub(1), true)?;

        self.remove_scratch(&local_video);
        if let Some(v) = local_voice.as_deref() {
            self.remove_scratch(v);
        }
        for path in &aux_downloads {
            self.remove_scratch(path);
        }
        tracing::info!(fragments = rendered, "video complete");
        Ok(rendered)
    }

    /// Walk the fragment spans from the resume point to the end of the video,
    /// recording durable progress after each one. Returns the fragment count
    /// and the next free fragment index.
    #[allow(clippy::too_many_arguments)]
    fn render_fragments(
        &self,
        ledger: &CheckpointLedger,
        name: &str,
        stem: &str,
        local_video: &Path,
        local_voice: Option<&Path>,
        duration_secs: f64,
        mut start_offset: f64,
        mut fragment_index: u32,
        music: &[String],
        hooks: &[String],
        mut overlay: Option<&mut (dyn CaptionOverlay + 'static)>,
        aux_downloads: &mut BTreeSet<PathBuf>,
    ) -> ReelResult<(usize, u32)> {
        let mut rendered = 0usize;
        while start_offset < duration_secs {
            let span = TimeSpan::new(
                start_offset,
                (start_offset + self.opts.fragment_duration).min(duration_secs),
            )?;
            self.process_fragment(
                name,
                stem,
                fragment_index,
                local_video,
                local_voice,
                span,
                music,
                hooks,
                overlay.as_deref_mut(),
                aux_downloads,
            )?;
            // Durable progress before moving on; crash recovery resumes at
            // the fragment after this one.
            ledger.record(name, fragment_index, false)?;
            start_offset += self.opts.fragment_duration;
            fragment_index += 1;
            rendered += 1;
        }
        Ok((rendered, fragment_index))
    }

    /// Produce and upload one fragment. Safe to repeat: all intermediates
    /// are deterministically named and overwritten.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip_all, fields(video = %name, fragment = fragment_index))]
    fn process_fragment(
        &self,
        name: &str,
        stem: &str,
        fragment_index: u32,
        local_video: &Path,
        local_voice: Option<&Path>,
        span: TimeSpan,
        music: &[String],
        hooks: &[String],
        mut overlay: Option<&mut (dyn CaptionOverlay + 'static)>,
        aux_downloads: &mut BTreeSet<PathBuf>,
    ) -> ReelResult<()> {
        let fragment_name = format!("fragment_{fragment_index}_{name}");
        let log_state = |state: FragmentState| {
            tracing::info!(state = state.as_str(), "fragment stage");
        };
        log_state(FragmentState::Pending);

        log_state(FragmentState::Downloading);
        let music_key = &music[fragment_index as usize % music.len()];
        let local_music = self.download_if_absent(music_key)?;
        aux_downloads.insert(local_music.clone());
        let hook = if hooks.is_empty() {
            None
        } else {
            let key = &hooks[fragment_index as usize % hooks.len()];
            let local = self.download_if_absent(key)?;
            aux_downloads.insert(local.clone());
            let info = self.engine.probe(&local)?;
            Some((local, info.duration_secs))
        };

        log_state(FragmentState::Slicing);
        let voice_layer = local_voice
            .map(|p| {
                self.engine
                    .decode_audio(p, Some(span), self.opts.sample_rate)
                    .map(|pcm| AudioLayer { pcm, gain: 1.0 })
            })
            .transpose()?;

        log_state(FragmentState::ComposingAudio);
        let music_layer = AudioLayer {
            pcm: self
                .engine
                .decode_audio(&local_music, None, self.opts.sample_rate)?,
            gain: MUSIC_GAIN,
        };
        let hook_audio = hook
            .as_ref()
            .map(|(path, duration_secs)| {
                let pcm = self.engine.decode_audio(path, None, self.opts.sample_rate)?;
                Ok::<_, ReelError>(HookAudio {
                    voice: AudioLayer { pcm, gain: 1.0 },
                    music: Some(music_layer.clone()),
                    duration_secs: *duration_secs,
                })
            })
            .transpose()?;
        let mix = compose(
            voice_layer.as_ref(),
            &music_layer,
            hook_audio.as_ref(),
            span.duration(),
            self.opts.sample_rate,
        )?;
        let pcm_path = self.opts.scratch_dir.join(format!("{fragment_name}.f32le"));
        write_pcm_f32le(&mix.interleaved_f32, &pcm_path)?;

        let cues: Vec<CaptionCue> = if overlay.is_some() {
            let voice = local_voice.ok_or_else(|| {
                ReelError::validation("captions are enabled but the fragment has no voice track")
            })?;
            log_state(FragmentState::Transcribing);
            let wav_name = format!("fragment_{fragment_index}_{stem}.wav");
            let wav_path = self.opts.scratch_dir.join(&wav_name);
            self.engine.extract_audio_slice(voice, span, &wav_path)?;
            let wav_key = format!("{}/{wav_name}", store::prefix::VOICES);
            self.store.put(&wav_path, &wav_key)?;

            let job = self.transcriber.submit(&wav_key, &self.opts.language)?;
            let transcript_key = wait_for_transcript(self.transcriber, &job, self.opts.poll)?;

            log_state(FragmentState::CaptionBuilding);
            let json_path = self.opts.scratch_dir.join(format!("{fragment_name}.json"));
            self.store.get(&transcript_key, &json_path)?;
            let bytes = std::fs::read(&json_path).map_err(|e| {
                ReelError::transcription(format!("failed to read transcript: {e}"))
            })?;
            let doc = parse_transcript(&bytes)?;
            // Cue times are fragment-local: the transcript was produced from
            // the fragment's own voice slice.
            let cues = build_cues(&doc.results.items, 0.0)?;
            self.export_srt(&cues, fragment_index, stem)?;
            self.remove_scratch(&wav_path);
            self.remove_scratch(&json_path);
            cues
        } else {
            Vec::new()
        };

        log_state(FragmentState::Rendering);
        let out_path = self.opts.scratch_dir.join(&fragment_name);
        let mut sink = self.engine.frame_sink(&out_path)?;
        sink.begin(SinkConfig {
            canvas: self.opts.canvas,
            fps: self.opts.fps,
            audio: Some(AudioInputConfig {
                path: pcm_path.clone(),
                sample_rate: self.opts.sample_rate,
                channels: 2,
            }),
        })?;

        let mut frame_index = 0u64;
        if let Some((hook_path, hook_duration)) = hook.as_ref() {
            // Hook frames pass through without captions.
            let hook_span = TimeSpan::new(0.0, *hook_duration)?;
            let mut source =
                self.engine
                    .frame_source(hook_path, hook_span, self.opts.canvas, self.opts.fps)?;
            while let Some(frame) = source.next_frame()? {
                sink.push_frame(FrameIndex(frame_index), &frame)?;
                frame_index += 1;
            }
        }

        let mut source =
            self.engine
                .frame_source(local_video, span, self.opts.canvas, self.opts.fps)?;
        let mut local_frame = 0u64;
        while let Some(mut frame) = source.next_frame()? {
            if let Some(r) = overlay.as_deref_mut() {
                let t = self.opts.fps.frames_to_secs(local_frame);
                r.apply(&mut frame, t, &cues)?;
            }
            sink.push_frame(FrameIndex(frame_index), &frame)?;
            frame_index += 1;
            local_frame += 1;
        }
        log_state(FragmentState::Encoding);
        sink.end()?;

        log_state(FragmentState::Uploading);
        let reel_key = format!("{}/{fragment_name}", store::prefix::REELS);
        self.store.put(&out_path, &reel_key)?;

        self.remove_scratch(&out_path);
        self.remove_scratch(&pcm_path);
        log_state(FragmentState::Complete);
        Ok(())
    }

    /// Upload the fragment's cue timeline as `transcript/<fragment>.srt`.
    fn export_srt(&self, cues: &[CaptionCue], fragment_index: u32, stem: &str) -> ReelResult<()> {
        let srt_name = format!("fragment_{fragment_index}_{stem}.srt");
        let srt_path = self.opts.scratch_dir.join(&srt_name);
        let file = std::fs::File::create(&srt_path).map_err(|e| {
            ReelError::caption(format!("failed to create '{}': {e}", srt_path.display()))
        })?;
        write_srt(cues, std::io::BufWriter::new(file))?;
        let srt_key = format!("{}/{srt_name}", store::prefix::TRANSCRIPT);
        self.store.put(&srt_path, &srt_key)?;
        self.remove_scratch(&srt_path);
        Ok(())
    }

    /// Download `key` into the scratch dir unless an earlier run already
    /// left it there.
    fn download_if_absent(&self, key: &str) -> ReelResult<PathBuf> {
        let local = self.opts.scratch_dir.join(store::key_name(key));
        if !local.exists() {
            self.store.get(key, &local)?;
        }
        Ok(local)
    }

    fn remove_scratch(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_states_have_stable_log_names() {
        assert_eq!(FragmentState::ComposingAudio.as_str(), "composing_audio");
        assert_eq!(FragmentState::Complete.as_str(), "complete");
    }

    #[test]
    fn fragment_states_follow_the_processing_order() {
        let names: Vec<&str> = FragmentState::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(
            names,
            [
                "pending",
                "downloading",
                "slicing",
                "composing_audio",
                "transcribing",
                "caption_building",
                "rendering",
                "encoding",
                "uploading",
                "complete",
            ]
        );
    }

    #[test]
    fn opts_validate_rejects_bad_values() {
        let mut opts = PipelineOpts::new("/tmp/s", "/tmp/l");
        opts.fragment_duration = 0.0;
        assert!(opts.validate().is_err());

        let mut opts = PipelineOpts::new("/tmp/s", "/tmp/l");
        opts.sample_rate = 0;
        assert!(opts.validate().is_err());
    }
}
