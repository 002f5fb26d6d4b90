//! Turns a story configuration into a narrated, captioned slideshow video.

pub mod assembler;
pub mod asset;
pub mod audio;
pub mod backends;
pub mod capability;
pub mod captions;
pub mod config;
pub mod credits;
pub mod error;
pub mod ffmpeg;
pub mod job;
pub mod pipeline;
pub mod retry;
pub mod scene;
pub mod timeline;

pub use capability::{
    BackendError, FailureKind, ImageGenerator, MusicGenerator, NarrationOutput,
    NarrationSynthesizer, WordTiming,
};
pub use config::{AssetSpec, CaptionStyle, PipelineSettings, StoryConfig};
pub use error::{ErrorKind, Result, TtvError};
pub use ffmpeg::{EncodeStep, Encoder, FfmpegEncoder};
pub use job::{JobReport, JobState, SceneStatus};
pub use pipeline::Orchestrator;
pub use retry::RetryPolicy;
