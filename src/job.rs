//! Per-job working directory and the report a job leaves behind.

use chrono::Local;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{ErrorKind, Result, TtvError};

/// Where the pipeline is, in the order it gets there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Validating,
    ResolvingSharedAssets,
    GeneratingScenes,
    Synchronizing,
    BuildingTimeline,
    Rendering,
    BuildingCredits,
    Assembled,
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneStatus {
    Pending,
    Generated,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct SceneReport {
    pub index: usize,
    pub status: SceneStatus,
    pub retries: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobFailure {
    /// Last state entered before the failure.
    pub state: JobState,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: String,
    pub state: JobState,
    pub scenes: Vec<SceneReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl JobReport {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            state: JobState::Validating,
            scenes: Vec::new(),
            output: None,
            total_duration: None,
            work_dir: None,
            error: None,
        }
    }

    pub fn enter(&mut self, state: JobState) {
        info!(job = %self.job_id, from = ?self.state, to = ?state, "job state");
        self.state = state;
    }

    pub fn fail(&mut self, err: &TtvError) {
        error!(job = %self.job_id, state = ?self.state, error = %err, "job failed");
        self.error = Some(JobFailure {
            state: self.state,
            kind: err.kind(),
            message: err.to_string(),
        });
        for scene in &mut self.scenes {
            if scene.status == SceneStatus::Pending {
                scene.status = SceneStatus::Cancelled;
            }
        }
        self.state = JobState::Failed;
    }

    pub fn succeeded(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TtvError::RenderError(format!("cannot serialize job report: {e}")))
    }
}

/// A job's private working directory under the work root.
#[derive(Debug)]
pub struct RenderJob {
    id: String,
    dir: PathBuf,
    keep: bool,
}

impl RenderJob {
    fn new_id() -> String {
        let short = Uuid::new_v4().simple().to_string();
        format!("ttv-{}-{}", Local::now().format("%Y%m%d-%H%M%S"), &short[..8])
    }

    pub async fn create(work_root: &Path, keep: bool) -> Result<Self> {
        let id = Self::new_id();
        let dir = work_root.join(&id);
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "created job directory");
        Ok(Self { id, dir, keep })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Remove intermediates after a successful job unless asked to keep
    /// them. Returns the directory if it is still on disk.
    pub async fn finish(self, success: bool) -> Option<PathBuf> {
        if self.keep || !success {
            info!(dir = %self.dir.display(), "keeping job directory");
            return Some(self.dir);
        }
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => None,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "could not remove job directory");
                Some(self.dir)
            }
        }
    }
}

/// `<dest>.part`, next to `dest`.
fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Move a finished video to `dest` without ever exposing a partial file
/// there. Falls back to copy-then-rename across filesystems.
pub async fn commit_output(src: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    if tokio::fs::rename(src, dest).await.is_ok() {
        return Ok(());
    }
    let staging = staging_path(dest);
    tokio::fs::copy(src, &staging).await?;
    if let Err(e) = tokio::fs::rename(&staging, dest).await {
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(e.into());
    }
    Ok(())
}
