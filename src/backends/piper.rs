use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, error};

use crate::capability::{BackendError, NarrationOutput, NarrationSynthesizer};

/// Local text-to-speech through the `piper` executable. Text goes in on
/// stdin, a WAV file comes out.
#[derive(Debug, Clone)]
pub struct PiperNarrator {
    program: String,
    model: PathBuf,
}

impl PiperNarrator {
    pub fn new(model: impl Into<PathBuf>) -> Self {
        Self {
            program: "piper".to_string(),
            model: model.into(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl NarrationSynthesizer for PiperNarrator {
    async fn synthesize(&self, text: &str, out: &Path) -> Result<NarrationOutput, BackendError> {
        debug!(chars = text.len(), out = %out.display(), "calling piper");
        let mut child = Command::new(&self.program)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_file")
            .arg(out)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::fatal(format!("failed to spawn {}: {e}", self.program)))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| BackendError::fatal("piper stdin was not captured"))?;
            stdin.write_all(text.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            error!(out = %out.display(), "piper failed");
            return Err(BackendError::fatal(format!(
                "piper exited with {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(NarrationOutput::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let narrator = PiperNarrator::new("voice.onnx").with_program("/nonexistent/piper");
        let err = narrator
            .synthesize("hello", &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn text_is_piped_to_the_engine() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-piper");
        // $1=--model $2=model $3=--output_file $4=out
        std::fs::write(&script, "#!/bin/sh\ncat > \"$4\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = dir.path().join("out.wav");
        PiperNarrator::new("voice.onnx")
            .with_program(script.display().to_string())
            .synthesize("A door opens", &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "A door opens");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = PiperNarrator::new("voice.onnx")
            .with_program("false")
            .synthesize("x", &dir.path().join("out.wav"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }
}
