use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use storyreel::{PipelineSettings, RetryPolicy};

/// Render a story configuration into a narrated, captioned video.
#[derive(Parser, Debug)]
#[clap(name = "storyreel", version)]
pub struct Args {
    /// Story configuration (JSON).
    pub config: PathBuf,

    #[clap(long, default_value = "out.mp4")]
    pub out: PathBuf,

    /// Root for per-job working directories.
    #[clap(long)]
    pub work_dir: Option<PathBuf>,

    #[clap(long)]
    pub keep_intermediates: bool,

    #[clap(long, default_value_t = 4)]
    pub concurrency: usize,

    #[clap(long, default_value_t = 5)]
    pub max_attempts: u32,

    #[clap(long, default_value_t = 300)]
    pub timeout_secs: u64,

    /// Use placeholder frames instead of calling an image model.
    #[clap(long)]
    pub skip_generation: bool,

    #[clap(long, default_value = "./tts/en_US-hfc_male-medium.onnx")]
    pub piper_model: PathBuf,

    /// Write the job report as JSON to this path, or `-` for stdout.
    #[clap(long)]
    pub report: Option<String>,

    /// Local music generator tried when the hosted one fails; called as
    /// `<PROGRAM> <prompt> <out.wav>`.
    #[clap(long)]
    pub music_fallback: Option<String>,

    #[clap(long, default_value_t = 1)]
    pub words_per_cue: usize,

    #[clap(long, default_value_t = 0.3)]
    pub music_volume: f32,

    #[clap(long, default_value = "ffmpeg")]
    pub ffmpeg: String,

    #[clap(long, default_value = "ffprobe")]
    pub ffprobe: String,

    #[clap(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn settings(&self) -> PipelineSettings {
        let defaults = PipelineSettings::default();
        PipelineSettings {
            concurrency: self.concurrency.max(1),
            retry: RetryPolicy {
                max_attempts: self.max_attempts.max(1),
                ..RetryPolicy::default()
            },
            work_root: self.work_dir.clone().unwrap_or(defaults.work_root.clone()),
            keep_intermediates: self.keep_intermediates,
            music_volume: self.music_volume,
            words_per_cue: self.words_per_cue.max(1),
            ffmpeg: self.ffmpeg.clone(),
            ffprobe: self.ffprobe.clone(),
            ..defaults
        }
        .with_timeout(Duration::from_secs(self.timeout_secs))
    }
}
