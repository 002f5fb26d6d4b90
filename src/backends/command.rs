use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error};

use crate::capability::{BackendError, MusicGenerator};

/// Music from a local generator executable, called as
/// `<program> <prompt> <out.wav>`. Meant as a fallback behind a hosted
/// generator.
#[derive(Debug, Clone)]
pub struct CommandMusicGenerator {
    program: String,
}

impl CommandMusicGenerator {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MusicGenerator for CommandMusicGenerator {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn generate_music(&self, prompt: &str, out: &Path) -> Result<(), BackendError> {
        debug!(program = %self.program, out = %out.display(), "calling local music generator");
        let output = Command::new(&self.program)
            .arg(prompt)
            .arg(out)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| BackendError::fatal(format!("failed to spawn {}: {e}", self.program)))?;
        if !output.status.success() {
            error!(program = %self.program, "local music generator failed");
            return Err(BackendError::fatal(format!(
                "{} exited with {:?}: {}",
                self.program,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandMusicGenerator::new("/nonexistent/musicgen")
            .generate_music("calm piano", &dir.path().join("m.wav"))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn prompt_and_output_are_passed_as_arguments() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-musicgen");
        std::fs::write(&script, "#!/bin/sh\nprintf '%s' \"$1\" > \"$2\"\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let out = dir.path().join("m.wav");
        CommandMusicGenerator::new(script.display().to_string())
            .generate_music("calm piano", &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "calm piano");
    }
}
