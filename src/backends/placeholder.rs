use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::capability::{BackendError, ImageGenerator};

/// Solid-colour stills rendered with ffmpeg, for dry runs that should not
/// call an image model.
#[derive(Debug, Clone)]
pub struct PlaceholderImageGenerator {
    ffmpeg: String,
    width: u32,
    height: u32,
    color: String,
}

impl PlaceholderImageGenerator {
    pub fn new(ffmpeg: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            width,
            height,
            color: "0x1e1e2e".to_string(),
        }
    }

    fn args(&self, out: &Path) -> Vec<String> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "lavfi".into(),
            "-i".into(),
            format!("color=c={}:s={}x{}", self.color, self.width, self.height),
            "-frames:v".into(),
            "1".into(),
            out.display().to_string(),
        ]
    }
}

#[async_trait]
impl ImageGenerator for PlaceholderImageGenerator {
    async fn generate_image(&self, _prompt: &str, _style: &str, out: &Path) -> Result<(), BackendError> {
        let output = Command::new(&self.ffmpeg)
            .args(self.args(out))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::fatal(format!("failed to spawn {}: {e}", self.ffmpeg)))?;
        if !output.status.success() {
            return Err(BackendError::fatal(format!(
                "placeholder frame failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}
