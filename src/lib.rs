//! Reelsmith turns long-form source videos into short vertical reel fragments.
//!
//! The core is a resumable batch pipeline:
//!
//! - A [`ledger::CheckpointLedger`] makes multi-hour runs restartable after crashes
//! - An audio compositor ([`audio::compose`]) mixes voice, background music and an
//!   optional hook pre-roll into one exact-length track per fragment
//! - A caption renderer ([`render::CaptionRenderer`]) burns word-by-word highlighted
//!   subtitles onto every frame, driven by transcription-derived cues
//! - [`pipeline::FragmentPipeline`] ties them together per video, per fragment
//!
//! Object storage, transcription, and media decode/encode are external collaborators
//! behind narrow traits ([`store::ObjectStore`], [`transcribe::TranscriptionService`],
//! [`media::MediaEngine`]).
#![forbid(unsafe_code)]

pub mod audio;
pub mod captions;
pub mod clips;
pub mod foundation;
pub mod ledger;
pub mod media;
pub mod pipeline;
pub mod render;
pub mod store;
pub mod transcribe;

pub use foundation::core::{Canvas, Fps, FrameIndex, FrameRGBA, TimeSpan};
pub use foundation::error::{ReelError, ReelResult};

pub use captions::{CaptionCue, build_cues};
pub use media::{FrameSink, FrameSource, InMemorySink, MediaEngine, SinkConfig};
pub use pipeline::{FragmentPipeline, PipelineOpts, RunStats};
pub use render::{CaptionOverlay, CaptionRenderer, CaptionStyle};
