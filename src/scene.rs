//! Per-scene generation: one illustration and one narration clip.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{info, instrument};

use crate::asset::{AssetKind, Provenance, ResolvedAsset, ensure_written, generation_failed};
use crate::capability::{BackendError, ImageGenerator, NarrationSynthesizer, WordTiming};
use crate::error::{Result, TtvError};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone)]
pub struct SceneAssets {
    pub index: usize,
    pub image: ResolvedAsset,
    pub narration: ResolvedAsset,
    pub word_timings: Option<Vec<WordTiming>>,
    /// Narration length, which is also the scene's on-screen length.
    pub duration: f64,
}

/// What came back from generating one scene, successful or not.
#[derive(Debug)]
pub struct SceneOutcome {
    pub index: usize,
    pub result: Result<SceneAssets>,
    pub retries: u32,
}

pub struct SceneAssetGenerator {
    images: Arc<dyn ImageGenerator>,
    narrator: Arc<dyn NarrationSynthesizer>,
    retry: RetryPolicy,
    ffprobe: String,
    dir: PathBuf,
}

pub fn scene_dir(job_dir: &Path, index: usize) -> PathBuf {
    job_dir.join(format!("scene_{index:03}"))
}

impl SceneAssetGenerator {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        narrator: Arc<dyn NarrationSynthesizer>,
        retry: RetryPolicy,
        ffprobe: impl Into<String>,
        job_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            images,
            narrator,
            retry,
            ffprobe: ffprobe.into(),
            dir: job_dir.into(),
        }
    }

    /// Generate the image and narration for scene `index`. The two backend
    /// calls run concurrently; the first fatal failure abandons the other.
    #[instrument(skip_all, fields(scene = index))]
    pub async fn generate(&self, index: usize, text: &str, style: &str) -> SceneOutcome {
        let retries = AtomicU32::new(0);
        let result = self.generate_inner(index, text, style, &retries).await;
        SceneOutcome {
            index,
            result,
            retries: retries.load(Ordering::SeqCst),
        }
    }

    async fn generate_inner(
        &self,
        index: usize,
        text: &str,
        style: &str,
        retries: &AtomicU32,
    ) -> Result<SceneAssets> {
        let dir = scene_dir(&self.dir, index);
        tokio::fs::create_dir_all(&dir).await?;
        let image_path = dir.join(format!("image.{}", self.images.extension()));
        let narration_path = dir.join(format!("narration.{}", self.narrator.extension()));

        let image = async {
            let out = image_path.as_path();
            let images = &self.images;
            let attempted = self
                .retry
                .run("scene image", move || async move {
                    images.generate_image(text, style, out).await?;
                    ensure_written(out).await
                })
                .await;
            retries.fetch_add(attempted.retries(), Ordering::SeqCst);
            generation_failed(format!("image for scene {index}"), attempted)
        };

        let narration = async {
            let out = narration_path.as_path();
            let narrator = &self.narrator;
            let attempted = self
                .retry
                .run("scene narration", move || async move {
                    let output = narrator.synthesize(text, out).await?;
                    ensure_written(out).await?;
                    Ok(output)
                })
                .await;
            retries.fetch_add(attempted.retries(), Ordering::SeqCst);
            generation_failed(format!("narration for scene {index}"), attempted)
        };

        let ((), output) = tokio::try_join!(image, narration)?;

        let narration = ResolvedAsset::measured(
            narration_path,
            AssetKind::Audio,
            Provenance::Generated,
            &self.ffprobe,
        )
        .await
        .map_err(|e| TtvError::GenerationFailed {
            what: format!("narration for scene {index}"),
            attempts: 1,
            source: BackendError::fatal(e.to_string()),
        })?;
        let duration = narration.duration.unwrap_or_default();
        info!(duration, "scene assets ready");

        Ok(SceneAssets {
            index,
            image: ResolvedAsset {
                path: image_path,
                kind: AssetKind::Image,
                provenance: Provenance::Generated,
                duration: None,
            },
            narration,
            word_timings: output.word_timings,
            duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::write_silence;
    use crate::capability::NarrationOutput;
    use async_trait::async_trait;
    use std::time::Duration;

    struct TextImages {
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl ImageGenerator for TextImages {
        async fn generate_image(
            &self,
            prompt: &str,
            style: &str,
            out: &Path,
        ) -> std::result::Result<(), BackendError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                // a half-written file from a failed attempt must not leak through
                tokio::fs::write(out, b"partial").await?;
                return Err(BackendError::transient("503 service unavailable"));
            }
            tokio::fs::write(out, format!("{prompt} in {style}")).await?;
            Ok(())
        }
    }

    /// One second of narration per word.
    struct WordClock;

    #[async_trait]
    impl NarrationSynthesizer for WordClock {
        async fn synthesize(
            &self,
            text: &str,
            out: &Path,
        ) -> std::result::Result<NarrationOutput, BackendError> {
            write_silence(out, text.split_whitespace().count() as f64)?;
            Ok(NarrationOutput::default())
        }
    }

    struct Mute;

    #[async_trait]
    impl NarrationSynthesizer for Mute {
        async fn synthesize(
            &self,
            _text: &str,
            out: &Path,
        ) -> std::result::Result<NarrationOutput, BackendError> {
            write_silence(out, 0.0)?;
            Ok(NarrationOutput::default())
        }
    }

    fn generator(
        dir: &Path,
        image_failures: u32,
        narrator: Arc<dyn NarrationSynthesizer>,
    ) -> SceneAssetGenerator {
        SceneAssetGenerator::new(
            Arc::new(TextImages {
                failures_left: AtomicU32::new(image_failures),
            }),
            narrator,
            RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                ..RetryPolicy::default()
            },
            "ffprobe",
            dir,
        )
    }

    #[tokio::test]
    async fn scene_duration_is_narration_length() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = generator(dir.path(), 0, Arc::new(WordClock))
            .generate(2, "a light appears", "ink")
            .await;
        let assets = outcome.result.unwrap();
        assert_eq!(outcome.retries, 0);
        assert!((assets.duration - 3.0).abs() < 1e-9);
        assert_eq!(assets.image.path, dir.path().join("scene_002/image.png"));
        assert_eq!(assets.narration.path, dir.path().join("scene_002/narration.wav"));
    }

    #[tokio::test]
    async fn retried_scene_matches_clean_scene() {
        let dir = tempfile::tempdir().unwrap();
        let flaky = generator(&dir.path().join("flaky"), 1, Arc::new(WordClock))
            .generate(0, "A door opens", "ink")
            .await;
        let clean = generator(&dir.path().join("clean"), 0, Arc::new(WordClock))
            .generate(0, "A door opens", "ink")
            .await;
        assert_eq!(flaky.retries, 1);
        assert_eq!(clean.retries, 0);
        let (flaky, clean) = (flaky.result.unwrap(), clean.result.unwrap());
        assert_eq!(flaky.duration, clean.duration);
        assert_eq!(
            tokio::fs::read(&flaky.image.path).await.unwrap(),
            tokio::fs::read(&clean.image.path).await.unwrap()
        );
    }

    #[tokio::test]
    async fn exhausted_retries_fail_the_scene() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = generator(dir.path(), 10, Arc::new(WordClock))
            .generate(1, "A door opens", "ink")
            .await;
        assert_eq!(outcome.retries, 2);
        match outcome.result.unwrap_err() {
            TtvError::GenerationFailed { what, attempts, .. } => {
                assert_eq!(attempts, 3);
                assert!(what.contains("scene 1"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn silent_narration_is_a_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = generator(dir.path(), 0, Arc::new(Mute))
            .generate(0, "A door opens", "ink")
            .await;
        assert!(matches!(
            outcome.result,
            Err(TtvError::GenerationFailed { .. })
        ));
    }
}
