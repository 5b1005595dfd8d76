//! ffmpeg/ffprobe-backed [`MediaEngine`] implementation.
//!
//! All media work shells out to the system `ffmpeg`/`ffprobe`. Decoding
//! streams raw RGBA frames out of a child's stdout; encoding streams raw
//! frames into a child's stdin, with stderr drained on a side thread so the
//! child can never block on a full pipe.

use crate::foundation::core::{Canvas, Fps, FrameIndex, FrameRGBA, TimeSpan};
use crate::foundation::error::{ReelError, ReelResult};
use crate::media::sink::{FrameSink, SinkConfig};
use crate::media::{AudioPcm, FrameSource, MediaEngine, MediaInfo};
use std::io::{Read, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// [`MediaEngine`] over the system `ffmpeg` and `ffprobe` binaries.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegEngine;

impl FfmpegEngine {
    /// Create an engine, verifying `ffmpeg` is reachable on `PATH`.
    pub fn new() -> ReelResult<Self> {
        if !is_ffmpeg_on_path() {
            return Err(ReelError::media(
                "ffmpeg is required, but was not found on PATH",
            ));
        }
        Ok(Self)
    }
}

impl MediaEngine for FfmpegEngine {
    fn probe(&self, path: &Path) -> ReelResult<MediaInfo> {
        probe_media(path)
    }

    fn decode_audio(
        &self,
        path: &Path,
        span: Option<TimeSpan>,
        sample_rate: u32,
    ) -> ReelResult<AudioPcm> {
        decode_audio_f32_stereo(path, span, sample_rate)
    }

    fn frame_source(
        &self,
        path: &Path,
        span: TimeSpan,
        target: Canvas,
        fps: Fps,
    ) -> ReelResult<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegFrameSource::open(path, span, target, fps)?))
    }

    fn frame_sink(&self, out_path: &Path) -> ReelResult<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegSink::new(out_path)))
    }

    fn transcode_slice(
        &self,
        input: &Path,
        span: TimeSpan,
        target: Canvas,
        out_path: &Path,
    ) -> ReelResult<()> {
        ensure_parent_dir(out_path)?;
        let out = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-ss", &format!("{:.6}", span.start)])
            .arg("-i")
            .arg(input)
            .args([
                "-t",
                &format!("{:.6}", span.duration()),
                "-vf",
                &format!("scale={}:{}", target.width, target.height),
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-movflags",
                "+faststart",
            ])
            .arg(out_path)
            .output()
            .map_err(|e| ReelError::media(format!("failed to run ffmpeg transcode: {e}")))?;
        check_exit("ffmpeg transcode", input, &out)
    }

    fn concat(&self, inputs: &[&Path], out_path: &Path) -> ReelResult<()> {
        if inputs.is_empty() {
            return Err(ReelError::validation("concat requires at least one input"));
        }
        ensure_parent_dir(out_path)?;

        // concat demuxer wants a list file with one `file '<path>'` per line.
        let mut list = String::new();
        for input in inputs {
            let canonical = input.canonicalize().map_err(|e| {
                ReelError::media(format!(
                    "failed to resolve concat input '{}': {e}",
                    input.display()
                ))
            })?;
            list.push_str(&format!("file '{}'\n", canonical.display()));
        }
        let list_path = out_path.with_extension("concat.txt");
        std::fs::write(&list_path, list)
            .map_err(|e| ReelError::media(format!("failed to write concat list: {e}")))?;

        let out = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "concat", "-safe", "0", "-i"])
            .arg(&list_path)
            .args(["-c", "copy"])
            .arg(out_path)
            .output()
            .map_err(|e| ReelError::media(format!("failed to run ffmpeg concat: {e}")))?;
        let result = check_exit("ffmpeg concat", &list_path, &out);
        if let Err(e) = std::fs::remove_file(&list_path) {
            tracing::warn!(error = %e, "failed to remove concat list file");
        }
        result
    }

    fn extract_audio_slice(
        &self,
        input: &Path,
        span: TimeSpan,
        out_path: &Path,
    ) -> ReelResult<()> {
        ensure_parent_dir(out_path)?;
        let out = Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-ss", &format!("{:.6}", span.start)])
            .arg("-i")
            .arg(input)
            .args([
                "-t",
                &format!("{:.6}", span.duration()),
                "-vn",
                "-acodec",
                "pcm_s16le",
                "-ac",
                "2",
                "-ar",
                "16000",
            ])
            .arg(out_path)
            .output()
            .map_err(|e| ReelError::media(format!("failed to run ffmpeg audio extract: {e}")))?;
        check_exit("ffmpeg audio extract", input, &out)
    }
}

/// Probe media metadata through `ffprobe`.
pub fn probe_media(path: &Path) -> ReelResult<MediaInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        r_frame_rate: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
        format: ProbeFormat,
    }

    let out = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(path)
        .output()
        .map_err(|e| ReelError::media(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(ReelError::media(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| ReelError::media(format!("ffprobe json parse failed: {e}")))?;
    let duration_secs = parsed
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| {
            ReelError::media(format!(
                "ffprobe reported no duration for '{}'",
                path.display()
            ))
        })?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let (width, height, fps) = match video {
        Some(v) => {
            let width = v
                .width
                .ok_or_else(|| ReelError::media("missing video width from ffprobe"))?;
            let height = v
                .height
                .ok_or_else(|| ReelError::media("missing video height from ffprobe"))?;
            let fps = v
                .r_frame_rate
                .as_deref()
                .and_then(parse_rational_fps)
                .ok_or_else(|| ReelError::media("missing video frame rate from ffprobe"))?;
            (width, height, fps)
        }
        None => (0, 0, Fps { num: 1, den: 1 }),
    };

    Ok(MediaInfo {
        duration_secs,
        width,
        height,
        fps,
        has_audio,
    })
}

fn parse_rational_fps(s: &str) -> Option<Fps> {
    let (num, den) = s.split_once('/')?;
    Fps::new(num.parse().ok()?, den.parse().ok()?).ok()
}

/// Decode audio (optionally a sub-span) to stereo interleaved `f32` PCM.
pub fn decode_audio_f32_stereo(
    path: &Path,
    span: Option<TimeSpan>,
    sample_rate: u32,
) -> ReelResult<AudioPcm> {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-v", "error"]);
    if let Some(span) = span {
        cmd.args(["-ss", &format!("{:.6}", span.start)]);
    }
    cmd.arg("-i").arg(path);
    if let Some(span) = span {
        cmd.args(["-t", &format!("{:.6}", span.duration())]);
    }
    let out = cmd
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &sample_rate.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| ReelError::media(format!("failed to run ffmpeg for audio decode: {e}")))?;

    if !out.status.success() {
        let msg = String::from_utf8_lossy(&out.stderr);
        // ffmpeg reports missing audio streams with an error. Treat that as
        // empty PCM so silent videos flow through the mixer unchanged.
        if msg.contains("Stream specifier")
            || msg.contains("matches no streams")
            || msg.contains("does not contain any stream")
        {
            return Ok(AudioPcm {
                sample_rate,
                channels: 2,
                interleaved_f32: Vec::new(),
            });
        }
        return Err(ReelError::media(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            msg.trim()
        )));
    }

    if !out.stdout.len().is_multiple_of(4) {
        return Err(ReelError::media(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }
    let mut pcm = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        pcm.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    Ok(AudioPcm {
        sample_rate,
        channels: 2,
        interleaved_f32: pcm,
    })
}

/// Streaming video decoder reading raw RGBA frames from an `ffmpeg` child.
pub struct FfmpegFrameSource {
    canvas: Canvas,
    frame_len: usize,
    source_path: PathBuf,

    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegFrameSource {
    /// Spawn a decoder for `span` of the video at `path`, scaled to `target`
    /// and resampled to `fps`.
    pub fn open(path: &Path, span: TimeSpan, target: Canvas, fps: Fps) -> ReelResult<Self> {
        if target.width == 0 || target.height == 0 {
            return Err(ReelError::validation(
                "frame source width/height must be non-zero",
            ));
        }

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-ss", &format!("{:.6}", span.start)])
            .arg("-i")
            .arg(path)
            .args([
                "-t",
                &format!("{:.6}", span.duration()),
                "-vf",
                &format!(
                    "scale={}:{},fps={}/{}",
                    target.width, target.height, fps.num, fps.den
                ),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                ReelError::media(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReelError::media("failed to open ffmpeg stdout (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::media("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        Ok(Self {
            canvas: target,
            frame_len: (target.width as usize) * (target.height as usize) * 4,
            source_path: path.to_path_buf(),
            child: Some(child),
            stdout: Some(stdout),
            stderr_drain: Some(stderr_drain),
        })
    }

    fn finish(&mut self) -> ReelResult<()> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        let status = child
            .wait()
            .map_err(|e| ReelError::media(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::media("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::media(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            return Err(ReelError::media(format!(
                "ffmpeg decode of '{}' exited with status {}: {}",
                self.source_path.display(),
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn next_frame(&mut self) -> ReelResult<Option<FrameRGBA>> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let mut data = vec![0u8; self.frame_len];
        let mut filled = 0usize;
        while filled < self.frame_len {
            let n = stdout.read(&mut data[filled..]).map_err(|e| {
                ReelError::media(format!("failed to read frame from ffmpeg stdout: {e}"))
            })?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < self.frame_len {
            return Err(ReelError::media(format!(
                "ffmpeg produced a truncated frame ({filled} of {} bytes) for '{}'",
                self.frame_len,
                self.source_path.display()
            )));
        }

        Ok(Some(FrameRGBA {
            width: self.canvas.width,
            height: self.canvas.height,
            data,
        }))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// MP4 encoder sink that spawns `ffmpeg` and streams raw frames to stdin.
///
/// Frames are opaque RGBA8 straight from the pipeline, so no alpha flattening
/// happens here. Audio is optional and provided through `SinkConfig.audio`.
pub struct FfmpegSink {
    out_path: PathBuf,

    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,

    cfg: Option<SinkConfig>,
    last_idx: Option<FrameIndex>,
}

impl FfmpegSink {
    /// Create a sink that encodes to `out_path`, overwriting it if present.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            child: None,
            stdin: None,
            stderr_drain: None,
            cfg: None,
            last_idx: None,
        }
    }
}

impl FrameSink for FfmpegSink {
    fn begin(&mut self, cfg: SinkConfig) -> ReelResult<()> {
        if cfg.canvas.width == 0 || cfg.canvas.height == 0 {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be non-zero",
            ));
        }
        if !cfg.canvas.width.is_multiple_of(2) || !cfg.canvas.height.is_multiple_of(2) {
            return Err(ReelError::validation(
                "ffmpeg sink width/height must be even (required for yuv420p mp4 output)",
            ));
        }

        ensure_parent_dir(&self.out_path)?;
        if !is_ffmpeg_on_path() {
            return Err(ReelError::media(
                "ffmpeg is required for MP4 encoding, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.canvas.width, cfg.canvas.height),
            "-r",
            &format!("{}/{}", cfg.fps.num, cfg.fps.den),
            "-i",
            "pipe:0",
        ]);

        if let Some(audio) = cfg.audio.as_ref() {
            if audio.sample_rate == 0 {
                return Err(ReelError::validation(
                    "audio sample_rate must be non-zero when audio is enabled",
                ));
            }
            if audio.channels == 0 {
                return Err(ReelError::validation(
                    "audio channels must be non-zero when audio is enabled",
                ));
            }
            cmd.args([
                "-f",
                "f32le",
                "-ar",
                &audio.sample_rate.to_string(),
                "-ac",
                &audio.channels.to_string(),
                "-i",
            ])
            .arg(&audio.path)
            .args([
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
                "-movflags",
                "+faststart",
            ]);
        } else {
            cmd.args([
                "-an",
                "-c:v",
                "libx264",
                "-pix_fmt",
                "yuv420p",
                "-movflags",
                "+faststart",
            ]);
        }
        cmd.arg(&self.out_path);

        let mut child = cmd.spawn().map_err(|e| {
            ReelError::media(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReelError::media("failed to open ffmpeg stdin (unexpected)"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReelError::media("failed to open ffmpeg stderr (unexpected)"))?;
        let stderr_drain = std::thread::spawn(move || {
            let mut stderr_bytes = Vec::new();
            stderr.read_to_end(&mut stderr_bytes)?;
            Ok(stderr_bytes)
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.cfg = Some(cfg);
        self.last_idx = None;
        Ok(())
    }

    fn push_frame(&mut self, idx: FrameIndex, frame: &FrameRGBA) -> ReelResult<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| ReelError::media("ffmpeg sink not started"))?;
        if let Some(last) = self.last_idx
            && idx.0 <= last.0
        {
            return Err(ReelError::media(
                "ffmpeg sink received out-of-order frame index",
            ));
        }
        self.last_idx = Some(idx);

        if frame.width != cfg.canvas.width || frame.height != cfg.canvas.height {
            return Err(ReelError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.canvas.width, cfg.canvas.height
            )));
        }
        frame.validate()?;

        let Some(stdin) = self.stdin.as_mut() else {
            return Err(ReelError::media("ffmpeg sink is already finalized"));
        };
        stdin
            .write_all(&frame.data)
            .map_err(|e| ReelError::media(format!("failed to write frame to ffmpeg stdin: {e}")))
    }

    fn end(&mut self) -> ReelResult<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| ReelError::media("ffmpeg sink not started"))?;

        let status = child
            .wait()
            .map_err(|e| ReelError::media(format!("failed to wait for ffmpeg to finish: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReelError::media("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| ReelError::media(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };

        if !status.success() {
            return Err(ReelError::media(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }

        self.cfg = None;
        Ok(())
    }
}

fn check_exit(what: &str, input: &Path, out: &std::process::Output) -> ReelResult<()> {
    if out.status.success() {
        Ok(())
    } else {
        Err(ReelError::media(format!(
            "{what} failed for '{}': {}",
            input.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )))
    }
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> ReelResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// No unit tests for the process plumbing: these functions shell out to
// `ffprobe`/`ffmpeg` and are best validated via integration tests that can be
// conditionally ignored when the tools are unavailable.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rational_fps_strings_parse() {
        assert_eq!(parse_rational_fps("30/1"), Some(Fps { num: 30, den: 1 }));
        assert_eq!(
            parse_rational_fps("30000/1001"),
            Some(Fps {
                num: 30_000,
                den: 1001
            })
        );
        assert_eq!(parse_rational_fps("0/0"), None);
        assert_eq!(parse_rational_fps("nonsense"), None);
    }
}
