use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, TtvError};

pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_TUNE: &str = "stillimage";
pub const PIXEL_FORMAT: &str = "yuv420p";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "192k";
pub const AUDIO_SAMPLE_RATE: u32 = 48_000;

/// One ffmpeg invocation. `args` excludes the program name and ends with
/// the output path.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeStep {
    pub label: String,
    pub args: Vec<String>,
    pub output: PathBuf,
}

impl EncodeStep {
    pub fn new(label: impl Into<String>, mut args: Vec<String>, output: &Path) -> Self {
        args.push(output.display().to_string());
        Self {
            label: label.into(),
            args,
            output: output.to_path_buf(),
        }
    }
}

#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(&self, step: &EncodeStep) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: String,
}

impl FfmpegEncoder {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfmpegEncoder {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(&self, step: &EncodeStep) -> Result<()> {
        info!(step = %step.label, output = %step.output.display(), "running ffmpeg");
        debug!(args = ?step.args, "ffmpeg arguments");
        let output = Command::new(&self.program)
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .args(&step.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| TtvError::RenderError(format!("failed to spawn {}: {e}", self.program)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(8).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            return Err(TtvError::RenderError(format!(
                "{} exited with status {:?}: {}",
                step.label,
                output.status.code(),
                tail.join("\n").trim()
            )));
        }
        Ok(())
    }
}

/// Seconds with millisecond precision, the way ffmpeg options take them.
pub fn format_time(value: f64) -> String {
    format!("{value:.3}")
}

/// Escape a path for use inside a filter graph argument.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(':', "\\:")
}

/// Burn in a SubRip file with the caption look shared by body and credits.
pub fn subtitles_filter(srt: &Path, font_size: u32) -> String {
    format!(
        "subtitles={}:force_style='Fontsize={font_size},OutlineColour=&H000000&,Outline=3,Shadow=0'",
        escape_filter_path(srt)
    )
}

/// Encoding arguments shared by every step that writes H.264/AAC.
pub fn output_codec_args(frame_rate: u32) -> Vec<String> {
    [
        "-c:v",
        VIDEO_CODEC,
        "-tune",
        VIDEO_TUNE,
        "-pix_fmt",
        PIXEL_FORMAT,
        "-r",
        &frame_rate.to_string(),
        "-c:a",
        AUDIO_CODEC,
        "-b:a",
        AUDIO_BITRATE,
        "-ar",
        &AUDIO_SAMPLE_RATE.to_string(),
        "-ac",
        "2",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Scale into a `width`x`height` frame, letterboxing as needed.
pub fn fit_filter(width: u32, height: u32) -> String {
    format!(
        "scale={width}:{height}:force_original_aspect_ratio=decrease,\
         pad={width}:{height}:(ow-iw)/2:(oh-ih)/2,setsar=1"
    )
}
