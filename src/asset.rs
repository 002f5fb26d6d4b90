//! Turns file-or-prompt specifications into files the job owns.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::audio::audio_duration;
use crate::capability::{BackendError, ImageGenerator, MusicGenerator};
use crate::config::AssetSpec;
use crate::error::{Result, TtvError};
use crate::retry::{Attempted, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Supplied,
    Generated,
}

/// A local media file inside the job working directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    pub provenance: Provenance,
    /// Measured length, present for audio.
    pub duration: Option<f64>,
}

impl ResolvedAsset {
    pub(crate) async fn measured(
        path: PathBuf,
        kind: AssetKind,
        provenance: Provenance,
        ffprobe: &str,
    ) -> Result<Self> {
        let duration = match kind {
            AssetKind::Audio => Some(audio_duration(&path, ffprobe).await?),
            AssetKind::Image => None,
        };
        Ok(Self {
            path,
            kind,
            provenance,
            duration,
        })
    }
}

/// Checks that a backend actually left a non-empty file behind.
pub(crate) async fn ensure_written(path: &Path) -> std::result::Result<(), BackendError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        Ok(_) => Err(BackendError::fatal(format!(
            "backend produced an empty file at {}",
            path.display()
        ))),
        Err(e) => Err(BackendError::fatal(format!(
            "backend produced no file at {}: {e}",
            path.display()
        ))),
    }
}

pub(crate) fn generation_failed<T>(what: String, attempted: Attempted<T>) -> Result<T> {
    let attempts = attempted.attempts;
    attempted
        .result
        .map_err(|source| TtvError::GenerationFailed {
            what,
            attempts,
            source,
        })
}

pub struct AssetResolver {
    images: Arc<dyn ImageGenerator>,
    /// Tried in order; each one gets the full retry policy.
    music: Vec<Arc<dyn MusicGenerator>>,
    retry: RetryPolicy,
    ffprobe: String,
    dir: PathBuf,
    style: String,
}

impl AssetResolver {
    /// `dir` is the job directory that resolved files are placed in;
    /// `style` is appended to image prompts.
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        music: Vec<Arc<dyn MusicGenerator>>,
        retry: RetryPolicy,
        ffprobe: impl Into<String>,
        dir: impl Into<PathBuf>,
        style: impl Into<String>,
    ) -> Self {
        Self {
            images,
            music,
            retry,
            ffprobe: ffprobe.into(),
            dir: dir.into(),
            style: style.into(),
        }
    }

    /// Resolve `spec` into `<dir>/<name>.<ext>`.
    ///
    /// `Unset` resolves to `None`; every call site treats that as "no such
    /// asset" rather than substituting anything.
    pub async fn resolve(
        &self,
        spec: &AssetSpec,
        kind: AssetKind,
        name: &str,
    ) -> Result<Option<ResolvedAsset>> {
        match spec {
            AssetSpec::Unset => Ok(None),
            AssetSpec::File(src) => self.resolve_file(src, kind, name).await.map(Some),
            AssetSpec::Prompt(prompt) => self.resolve_prompt(prompt, kind, name).await.map(Some),
        }
    }

    async fn resolve_file(&self, src: &Path, kind: AssetKind, name: &str) -> Result<ResolvedAsset> {
        let not_found = |reason: String| TtvError::AssetNotFound {
            path: src.to_path_buf(),
            reason,
        };
        let meta = tokio::fs::metadata(src)
            .await
            .map_err(|e| not_found(e.to_string()))?;
        if !meta.is_file() {
            return Err(not_found("not a regular file".to_string()));
        }
        tokio::fs::File::open(src)
            .await
            .map_err(|e| not_found(format!("unreadable: {e}")))?;

        let ext = src.extension().and_then(|e| e.to_str()).unwrap_or(match kind {
            AssetKind::Image => "png",
            AssetKind::Audio => "mp3",
        });
        let dest = self.dir.join(format!("{name}.{ext}"));
        tokio::fs::copy(src, &dest).await?;
        info!(src = %src.display(), dest = %dest.display(), "using supplied {name}");
        ResolvedAsset::measured(dest, kind, Provenance::Supplied, &self.ffprobe)
            .await
            .map_err(|e| not_found(format!("not decodable: {e}")))
    }

    async fn resolve_prompt(
        &self,
        prompt: &str,
        kind: AssetKind,
        name: &str,
    ) -> Result<ResolvedAsset> {
        info!(prompt, "generating {name}");
        if kind == AssetKind::Audio {
            return self.resolve_music(prompt, name).await;
        }
        let dest = self
            .dir
            .join(format!("{name}.{}", self.images.extension()));
        let out = dest.as_path();
        let attempted = self
            .retry
            .run(name, move || async move {
                self.images.generate_image(prompt, &self.style, out).await?;
                ensure_written(out).await
            })
            .await;
        generation_failed(name.to_string(), attempted)?;
        ResolvedAsset::measured(dest, kind, Provenance::Generated, &self.ffprobe).await
    }

    /// Walk the music generators in order until one produces a file.
    async fn resolve_music(&self, prompt: &str, name: &str) -> Result<ResolvedAsset> {
        let mut attempts = 0;
        let mut last_error = None;
        for (i, music) in self.music.iter().enumerate() {
            if i > 0 {
                warn!(generator = i, "falling back to the next music generator for {name}");
            }
            let dest = self.dir.join(format!("{name}.{}", music.extension()));
            let out = dest.as_path();
            let attempted = self
                .retry
                .run(name, move || async move {
                    music.generate_music(prompt, out).await?;
                    ensure_written(out).await
                })
                .await;
            attempts += attempted.attempts;
            match attempted.result {
                Ok(()) => {
                    return ResolvedAsset::measured(
                        dest,
                        AssetKind::Audio,
                        Provenance::Generated,
                        &self.ffprobe,
                    )
                    .await;
                }
                Err(e) => last_error = Some(e),
            }
        }
        let source = match last_error {
            Some(e) => e,
            None => {
                warn!("{name} requested from a prompt but no music generator is configured");
                BackendError::fatal("no music generator configured")
            }
        };
        Err(TtvError::GenerationFailed {
            what: name.to_string(),
            attempts,
            source,
        })
    }
}
