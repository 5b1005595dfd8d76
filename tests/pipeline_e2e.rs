//! End-to-end pipeline tests over fake media/transcription backends and a
//! filesystem object store.

use reelsmith::foundation::core::{Canvas, Fps, FrameIndex, FrameRGBA, TimeSpan};
use reelsmith::foundation::error::{ReelError, ReelResult};
use reelsmith::ledger::CheckpointLedger;
use reelsmith::media::{
    AudioPcm, FrameSink, FrameSource, MediaEngine, MediaInfo, SinkConfig,
};
use reelsmith::pipeline::{FragmentPipeline, PipelineOpts};
use reelsmith::render::CaptionOverlay;
use reelsmith::store::{FsObjectStore, ObjectStore};
use reelsmith::transcribe::{JobId, JobStatus, TranscriptionService};
use reelsmith::CaptionCue;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One completed encode captured by the fake engine.
#[derive(Clone, Debug)]
struct EncodeRecord {
    out_path: PathBuf,
    frames: u64,
    audio_sample_frames: u64,
}

/// Media engine that fabricates frames and audio without ffmpeg. Durations
/// are looked up by file name.
#[derive(Clone, Default)]
struct FakeEngine {
    durations: HashMap<String, f64>,
    encodes: Arc<Mutex<Vec<EncodeRecord>>>,
}

impl FakeEngine {
    fn with_duration(mut self, file_name: &str, secs: f64) -> Self {
        self.durations.insert(file_name.to_owned(), secs);
        self
    }

    fn duration_of(&self, path: &Path) -> ReelResult<f64> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.durations
            .get(name)
            .copied()
            .ok_or_else(|| ReelError::media(format!("no fake duration for '{name}'")))
    }
}

impl MediaEngine for FakeEngine {
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        Ok(MediaInfo {
            duration_secs: self.duration_of(path)?,
            width: 1920,
            height: 1080,
            fps: Fps { num: 30, den: 1 },
            has_audio: true,
        })
    }

    fn decode_audio(
        &self,
        path: &Path,
        span: Option<TimeSpan>,
        sample_rate: u32,
    ) -> ReelResult<AudioPcm> {
        let secs = match span {
            Some(s) => s.duration().min(self.duration_of(path)?),
            None => self.duration_of(path)?,
        };
        let frames = (secs * f64::from(sample_rate)).round() as usize;
        Ok(AudioPcm {
            sample_rate,
            channels: 2,
            interleaved_f32: vec![0.1; frames * 2],
        })
    }

    fn frame_source(
        &self,
        path: &Path,
        span: TimeSpan,
        target: Canvas,
        fps: Fps,
    ) -> ReelResult<Box<dyn FrameSource>> {
        self.duration_of(path)?;
        Ok(Box::new(FakeFrameSource {
            canvas: target,
            remaining: fps.secs_to_frames_round(span.duration()),
        }))
    }

    fn frame_sink(&self, out_path: &Path) -> ReelResult<Box<dyn FrameSink>> {
        Ok(Box::new(FakeSink {
            out_path: out_path.to_path_buf(),
            encodes: self.encodes.clone(),
            cfg: None,
            frames: 0,
        }))
    }

    fn transcode_slice(
        &self,
        _input: &Path,
        _span: TimeSpan,
        _target: Canvas,
        out_path: &Path,
    ) -> ReelResult<()> {
        std::fs::write(out_path, b"slice").map_err(|e| ReelError::media(e.to_string()))
    }

    fn concat(&self, _inputs: &[&Path], out_path: &Path) -> ReelResult<()> {
        std::fs::write(out_path, b"concat").map_err(|e| ReelError::media(e.to_string()))
    }

    fn extract_audio_slice(
        &self,
        _input: &Path,
        _span: TimeSpan,
        out_path: &Path,
    ) -> ReelResult<()> {
        std::fs::write(out_path, b"wav").map_err(|e| ReelError::media(e.to_string()))
    }
}

struct FakeFrameSource {
    canvas: Canvas,
    remaining: u64,
}

impl FrameSource for FakeFrameSource {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn next_frame(&mut self) -> ReelResult<Option<FrameRGBA>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(FrameRGBA::solid(
            self.canvas.width,
            self.canvas.height,
            [40, 40, 40],
        )))
    }
}

struct FakeSink {
    out_path: PathBuf,
    encodes: Arc<Mutex<Vec<EncodeRecord>>>,
    cfg: Option<SinkConfig>,
    frames: u64,
}

impl FrameSink for FakeSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        self.cfg = Some(cfg);
        self.frames = 0;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        assert_eq!(idx.0, self.frames, "frames must arrive in order");
        frame.validate()?;
        self.frames += 1;
        Ok(())
    }

    fn end(&mut self) -> ReelResult<()> {
        let cfg = self
            .cfg
            .take()
            .ok_or_else(|| ReelError::media("sink not started"))?;
        let audio_sample_frames = match cfg.audio {
            Some(audio) => {
                let bytes = std::fs::read(&audio.path)
                    .map_err(|e| ReelError::media(e.to_string()))?;
                (bytes.len() / 4 / usize::from(audio.channels)) as u64
            }
            None => 0,
        };
        std::fs::write(&self.out_path, b"mp4").map_err(|e| ReelError::media(e.to_string()))?;
        self.encodes.lock().unwrap().push(EncodeRecord {
            out_path: self.out_path.clone(),
            frames: self.frames,
            audio_sample_frames,
        });
        Ok(())
    }
}

/// Transcriber that never gets called in caption-less tests.
struct FakeTranscriber;

impl TranscriptionService for FakeTranscriber {
    fn submit(&self, media_key: &str, _language: &str) -> ReelResult<JobId> {
        Ok(JobId(media_key.to_owned()))
    }

    fn poll(&self, job: &JobId) -> ReelResult<JobStatus> {
        Ok(JobStatus::Completed(job.0.clone()))
    }
}

const TRANSCRIPT_JSON: &str = r#"{"results":{"items":[
    {"start_time":"0.2","end_time":"0.8","alternatives":[{"content":"hello"}]},
    {"start_time":"0.9","end_time":"1.4","alternatives":[{"content":"world"}]}
]}}"#;

/// Transcriber that records submissions and immediately publishes a
/// word-timed transcript document into the store.
struct PublishingTranscriber<'a> {
    store: &'a FsObjectStore,
    submitted: Mutex<Vec<String>>,
}

impl TranscriptionService for PublishingTranscriber<'_> {
    fn submit(&self, media_key: &str, _language: &str) -> ReelResult<JobId> {
        self.submitted.lock().unwrap().push(media_key.to_owned());
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), TRANSCRIPT_JSON).unwrap();
        let key = format!("transcript/{}.json", reelsmith::store::key_stem(media_key));
        self.store.put(tmp.path(), &key)?;
        Ok(JobId(key))
    }

    fn poll(&self, job: &JobId) -> ReelResult<JobStatus> {
        Ok(JobStatus::Completed(job.0.clone()))
    }
}

/// Overlay that records every call instead of rasterizing text.
#[derive(Clone, Default)]
struct RecordingOverlay {
    frames_seen: Arc<Mutex<u64>>,
    words_seen: Arc<Mutex<BTreeSet<String>>>,
}

impl CaptionOverlay for RecordingOverlay {
    fn apply(&mut self, frame: &mut FrameRGBA, _t: f64, cues: &[CaptionCue]) -> ReelResult<()> {
        frame.validate()?;
        *self.frames_seen.lock().unwrap() += 1;
        let mut words = self.words_seen.lock().unwrap();
        for cue in cues {
            words.insert(cue.text.clone());
        }
        Ok(())
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    store: FsObjectStore,
    opts: PipelineOpts,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = FsObjectStore::new(dir.path().join("store")).unwrap();
    let mut opts = PipelineOpts::new(
        dir.path().join("scratch"),
        dir.path().join("processed_fragments.log"),
    );
    opts.captions = false;
    // Keep the fabricated PCM small.
    opts.sample_rate = 1_000;
    Fixture {
        _dir: dir,
        store,
        opts,
    }
}

fn seed_object(store: &FsObjectStore, key: &str) {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"media").unwrap();
    store.put(tmp.path(), key).unwrap();
}

#[test]
fn slices_a_video_into_exactly_three_fragments() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    let engine = FakeEngine::default()
        .with_duration("v.mp4", 200.0)
        .with_duration("m.mp3", 10.0);

    let mut pipeline =
        FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
            .unwrap();
    let stats = pipeline.run().unwrap();

    assert_eq!(stats.videos_processed, 1);
    assert_eq!(stats.videos_failed, 0);
    assert_eq!(stats.fragments_rendered, 3);

    let mut reels = fx.store.list("reels").unwrap();
    reels.sort();
    assert_eq!(
        reels,
        vec![
            "reels/fragment_1_v.mp4",
            "reels/fragment_2_v.mp4",
            "reels/fragment_3_v.mp4",
        ]
    );

    let ledger = CheckpointLedger::new(&fx.opts.ledger_path);
    let progress = ledger.load().unwrap();
    assert!(progress["v.mp4"].complete);
    assert_eq!(progress["v.mp4"].last_fragment, 3);
}

#[test]
fn audio_and_video_lengths_track_the_fragment_span() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    let engine = FakeEngine::default()
        .with_duration("v.mp4", 200.0)
        .with_duration("m.mp3", 10.0);

    FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
        .unwrap()
        .run()
        .unwrap();

    let encodes = engine.encodes.lock().unwrap();
    assert_eq!(encodes.len(), 3);
    // Full fragments: 90s at 30 fps and 1 kHz.
    assert_eq!(encodes[0].frames, 2700);
    assert_eq!(encodes[0].audio_sample_frames, 90_000);
    // The tail fragment covers only the remaining 20s.
    assert_eq!(encodes[2].frames, 600);
    assert_eq!(encodes[2].audio_sample_frames, 20_000);
    assert!(
        encodes[2]
            .out_path
            .to_string_lossy()
            .ends_with("fragment_3_v.mp4")
    );
}

#[test]
fn resumes_after_the_last_recorded_fragment() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    std::fs::write(&fx.opts.ledger_path, "v.mp4,3,incomplete\n").unwrap();

    let engine = FakeEngine::default()
        .with_duration("v.mp4", 450.0)
        .with_duration("m.mp3", 10.0);
    let stats =
        FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
            .unwrap()
            .run()
            .unwrap();

    // Fragments 1-3 are already durable; only 4 and 5 are produced.
    assert_eq!(stats.fragments_rendered, 2);
    let mut reels = fx.store.list("reels").unwrap();
    reels.sort();
    assert_eq!(
        reels,
        vec!["reels/fragment_4_v.mp4", "reels/fragment_5_v.mp4"]
    );

    let progress = CheckpointLedger::new(&fx.opts.ledger_path).load().unwrap();
    assert!(progress["v.mp4"].complete);
    assert_eq!(progress["v.mp4"].last_fragment, 5);
}

#[test]
fn completed_videos_are_skipped_on_rerun() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    std::fs::write(&fx.opts.ledger_path, "v.mp4,2,incomplete\nv.mp4,2,complete\n").unwrap();

    let engine = FakeEngine::default()
        .with_duration("v.mp4", 180.0)
        .with_duration("m.mp3", 10.0);
    let stats =
        FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
            .unwrap()
            .run()
            .unwrap();

    assert_eq!(stats.videos_skipped, 1);
    assert_eq!(stats.videos_processed, 0);
    assert!(fx.store.list("reels").unwrap().is_empty());
}

#[test]
fn a_failing_video_does_not_abort_the_run() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/a.mp4");
    seed_object(&fx.store, "video-to-mix/b.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    // No fake duration for a.mp4, so probing it fails.
    let engine = FakeEngine::default()
        .with_duration("b.mp4", 90.0)
        .with_duration("m.mp3", 10.0);

    let stats =
        FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
            .unwrap()
            .run()
            .unwrap();

    assert_eq!(stats.videos_failed, 1);
    assert_eq!(stats.videos_processed, 1);
    assert_eq!(
        fx.store.list("reels").unwrap(),
        vec!["reels/fragment_1_b.mp4"]
    );
}

#[test]
fn captions_require_an_overlay() {
    let fx = fixture();
    let engine = FakeEngine::default();
    let mut opts = fx.opts.clone();
    opts.captions = true;

    let err = FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, opts)
        .unwrap_err();
    assert!(err.to_string().contains("overlay"));
}

#[test]
fn scratch_copies_are_removed_after_a_video_completes() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    let engine = FakeEngine::default()
        .with_duration("v.mp4", 200.0)
        .with_duration("m.mp3", 10.0);

    FragmentPipeline::new(&fx.store, &engine, &FakeTranscriber, None, fx.opts.clone())
        .unwrap()
        .run()
        .unwrap();

    let leftovers: Vec<String> = std::fs::read_dir(&fx.opts.scratch_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(leftovers.is_empty(), "scratch not cleaned: {leftovers:?}");
}

#[test]
fn captioned_fragments_transcribe_their_voice_slices() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "voices/v.mp3");
    seed_object(&fx.store, "background-music/m.mp3");
    let engine = FakeEngine::default()
        .with_duration("v.mp4", 100.0)
        .with_duration("v.mp3", 100.0)
        .with_duration("m.mp3", 10.0);
    let transcriber = PublishingTranscriber {
        store: &fx.store,
        submitted: Mutex::new(Vec::new()),
    };
    let overlay = RecordingOverlay::default();

    let mut opts = fx.opts.clone();
    opts.captions = true;
    let stats = FragmentPipeline::new(
        &fx.store,
        &engine,
        &transcriber,
        Some(Box::new(overlay.clone())),
        opts,
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(stats.videos_processed, 1);
    assert_eq!(stats.fragments_rendered, 2);

    // Each fragment's voice slice is uploaded and submitted for transcription.
    assert_eq!(
        *transcriber.submitted.lock().unwrap(),
        vec![
            "voices/fragment_1_v.wav".to_owned(),
            "voices/fragment_2_v.wav".to_owned(),
        ]
    );

    // The overlay sees every fragment frame (90s + 10s at 30 fps) and the
    // transcript's words as cues.
    assert_eq!(*overlay.frames_seen.lock().unwrap(), 3_000);
    let words = overlay.words_seen.lock().unwrap();
    assert_eq!(
        words.iter().cloned().collect::<Vec<_>>(),
        vec!["hello".to_owned(), "world".to_owned()]
    );

    // Cue timelines are exported as SRT beside the transcripts.
    let mut transcripts = fx.store.list("transcript").unwrap();
    transcripts.sort();
    assert_eq!(
        transcripts,
        vec![
            "transcript/fragment_1_v.json",
            "transcript/fragment_1_v.srt",
            "transcript/fragment_2_v.json",
            "transcript/fragment_2_v.srt",
        ]
    );

    let leftovers: Vec<String> = std::fs::read_dir(&fx.opts.scratch_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert!(leftovers.is_empty(), "scratch not cleaned: {leftovers:?}");
}

#[test]
fn captions_without_a_matching_voice_fail_the_video() {
    let fx = fixture();
    seed_object(&fx.store, "video-to-mix/v.mp4");
    seed_object(&fx.store, "background-music/m.mp3");
    let engine = FakeEngine::default()
        .with_duration("v.mp4", 100.0)
        .with_duration("m.mp3", 10.0);

    let mut opts = fx.opts.clone();
    opts.captions = true;
    let stats = FragmentPipeline::new(
        &fx.store,
        &engine,
        &FakeTranscriber,
        Some(Box::new(RecordingOverlay::default())),
        opts,
    )
    .unwrap()
    .run()
    .unwrap();

    assert_eq!(stats.videos_failed, 1);
    assert_eq!(stats.videos_processed, 0);
    assert!(fx.store.list("reels").unwrap().is_empty());
}
