use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reelsmith::clips;
use reelsmith::ledger::CheckpointLedger;
use reelsmith::media::ffmpeg::FfmpegEngine;
use reelsmith::store::{FsObjectStore, ObjectStore as _, prefix};
use reelsmith::transcribe::StoreTranscription;
use reelsmith::{
    CaptionCue, CaptionOverlay, CaptionRenderer, CaptionStyle, Canvas, FragmentPipeline,
    FrameRGBA, PipelineOpts,
};

#[derive(Parser, Debug)]
#[command(name = "reelsmith", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process all pending videos into reel fragments (requires `ffmpeg` on PATH).
    Run(RunArgs),
    /// Rebuild the checkpoint ledger from already-uploaded fragments.
    InitLedger(InitLedgerArgs),
    /// Cut one stored video into fixed-length segments.
    Segment(SegmentArgs),
    /// Shuffle stored segments into one concatenated video.
    Randomize(RandomizeArgs),
    /// Render a single captioned frame as a PNG, for checking caption style.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct StoreArgs {
    /// Object store root directory.
    #[arg(long)]
    store: PathBuf,

    /// Local scratch directory.
    #[arg(long, default_value = "scratch")]
    scratch: PathBuf,
}

#[derive(Parser, Debug)]
struct RunArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Checkpoint ledger file.
    #[arg(long, default_value = "processed_fragments.log")]
    ledger: PathBuf,

    /// Fragment length in seconds.
    #[arg(long, default_value_t = 90.0)]
    fragment_duration: f64,

    /// Caption font file (TTF/OTF). Omit to disable captions.
    #[arg(long)]
    font: Option<PathBuf>,

    /// Prepend hook clips from the store's hooks/ prefix.
    #[arg(long, default_value_t = false)]
    hooks: bool,

    /// Transcription language hint.
    #[arg(long, default_value = "en-US")]
    language: String,
}

#[derive(Parser, Debug)]
struct InitLedgerArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Checkpoint ledger file to write.
    #[arg(long, default_value = "processed_fragments.log")]
    ledger: PathBuf,
}

#[derive(Parser, Debug)]
struct SegmentArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Store key of the video to segment (under video-to-mix/).
    #[arg(long)]
    video: String,

    /// Segment length in seconds.
    #[arg(long, default_value_t = 10.0)]
    duration: f64,
}

#[derive(Parser, Debug)]
struct RandomizeArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Shuffle seed; a given seed always yields the same order.
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Caption font file (TTF/OTF).
    #[arg(long)]
    font: PathBuf,

    /// Caption text to render.
    #[arg(long)]
    text: String,

    /// Presentation time within the sweep, in seconds.
    #[arg(long, default_value_t = 0.0)]
    t: f64,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match cli.cmd {
        Command::Run(args) => cmd_run(args),
        Command::InitLedger(args) => cmd_init_ledger(args),
        Command::Segment(args) => cmd_segment(args),
        Command::Randomize(args) => cmd_randomize(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn cmd_run(args: RunArgs) -> anyhow::Result<()> {
    let store = FsObjectStore::new(&args.store.store)?;
    let engine = FfmpegEngine::new()?;
    let transcriber = StoreTranscription::new(&store);

    let mut opts = PipelineOpts::new(&args.store.scratch, &args.ledger);
    opts.fragment_duration = args.fragment_duration;
    opts.hooks = args.hooks;
    opts.language = args.language;

    let overlay = args
        .font
        .as_deref()
        .map(|p| -> anyhow::Result<Box<dyn CaptionOverlay>> {
            let bytes =
                std::fs::read(p).with_context(|| format!("read font '{}'", p.display()))?;
            let renderer = CaptionRenderer::new(CaptionStyle::new(bytes), opts.canvas)?;
            Ok(Box::new(renderer))
        })
        .transpose()?;
    opts.captions = overlay.is_some();

    let mut pipeline = FragmentPipeline::new(&store, &engine, &transcriber, overlay, opts)?;
    let stats = pipeline.run()?;
    eprintln!(
        "processed {} video(s), skipped {}, failed {}, rendered {} fragment(s)",
        stats.videos_processed,
        stats.videos_skipped,
        stats.videos_failed,
        stats.fragments_rendered
    );
    Ok(())
}

fn cmd_init_ledger(args: InitLedgerArgs) -> anyhow::Result<()> {
    let store = FsObjectStore::new(&args.store.store)?;
    let keys = store.list(prefix::REELS)?;
    let ledger = CheckpointLedger::new(&args.ledger);
    let videos = ledger.rebuild_from_keys(keys.iter().map(|k| k.as_str()))?;
    eprintln!(
        "rebuilt {} from {videos} video(s) found under {}/",
        args.ledger.display(),
        prefix::REELS
    );
    Ok(())
}

fn cmd_segment(args: SegmentArgs) -> anyhow::Result<()> {
    let store = FsObjectStore::new(&args.store.store)?;
    let engine = FfmpegEngine::new()?;
    std::fs::create_dir_all(&args.store.scratch)?;

    let local = args
        .store
        .scratch
        .join(reelsmith::store::key_name(&args.video));
    store.get(&args.video, &local)?;

    let keys = clips::slice_segments(
        &engine,
        &store,
        &local,
        args.duration,
        Canvas {
            width: 720,
            height: 1080,
        },
        &args.store.scratch,
    )?;
    eprintln!("uploaded {} segment(s)", keys.len());
    Ok(())
}

fn cmd_randomize(args: RandomizeArgs) -> anyhow::Result<()> {
    let store = FsObjectStore::new(&args.store.store)?;
    let engine = FfmpegEngine::new()?;
    std::fs::create_dir_all(&args.store.scratch)?;

    let key = clips::randomize(&engine, &store, args.seed, &args.store.scratch)?;
    eprintln!("uploaded {key}");
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let canvas = Canvas {
        width: 720,
        height: 1080,
    };
    let font_bytes =
        std::fs::read(&args.font).with_context(|| format!("read font '{}'", args.font.display()))?;
    let mut renderer = CaptionRenderer::new(CaptionStyle::new(font_bytes), canvas)?;

    let cues = vec![CaptionCue {
        start: 0.0,
        end: args.t + 1.0,
        text: args.text.clone(),
    }];
    let mut frame = FrameRGBA::solid(canvas.width, canvas.height, [18, 20, 28]);
    renderer.apply(&mut frame, args.t, &cues)?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    image::save_buffer_with_format(
        &args.out,
        &frame.data,
        frame.width,
        frame.height,
        image::ColorType::Rgba8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
