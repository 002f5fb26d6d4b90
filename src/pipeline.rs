//! Runs one story configuration through every stage and reports the outcome.

use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::asset::{AssetKind, AssetResolver};
use crate::assembler::VideoAssembler;
use crate::capability::{ImageGenerator, MusicGenerator, NarrationSynthesizer};
use crate::captions::CaptionSynchronizer;
use crate::config::{AssetSpec, PipelineSettings, StoryConfig};
use crate::credits::{CreditsBuilder, wants_credits};
use crate::error::{Result, TtvError};
use crate::ffmpeg::Encoder;
use crate::job::{JobReport, JobState, RenderJob, SceneReport, SceneStatus, commit_output};
use crate::scene::{SceneAssetGenerator, SceneAssets};
use crate::timeline::{self, Scene};

pub struct Orchestrator {
    images: Arc<dyn ImageGenerator>,
    narrator: Arc<dyn NarrationSynthesizer>,
    music: Vec<Arc<dyn MusicGenerator>>,
    encoder: Arc<dyn Encoder>,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(
        images: Arc<dyn ImageGenerator>,
        narrator: Arc<dyn NarrationSynthesizer>,
        encoder: Arc<dyn Encoder>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            images,
            narrator,
            music: Vec::new(),
            encoder,
            settings,
        }
    }

    /// Add a music generator. The first one added is tried first; later
    /// ones are fallbacks. With none, music prompts fail with
    /// `GenerationFailed`.
    pub fn with_music_generator(mut self, music: Arc<dyn MusicGenerator>) -> Self {
        self.music.push(music);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Load the configuration at `config_path` and render it to `output`.
    pub async fn run(&self, config_path: &Path, output: &Path) -> JobReport {
        match StoryConfig::load(config_path).await {
            Ok(config) => self.render(&config, output).await,
            Err(e) => {
                let mut report = JobReport::new("-");
                report.fail(&e);
                report
            }
        }
    }

    /// Render an already parsed configuration. `output` only ever holds a
    /// complete video; it is written once every stage has succeeded.
    pub async fn render(&self, config: &StoryConfig, output: &Path) -> JobReport {
        if config.story.is_empty() {
            let mut report = JobReport::new("-");
            report.fail(&TtvError::EmptyStory);
            return report;
        }

        let job = match RenderJob::create(
            &self.settings.work_root,
            self.settings.keep_intermediates,
        )
        .await
        {
            Ok(job) => job,
            Err(e) => {
                let mut report = JobReport::new("-");
                report.fail(&e);
                return report;
            }
        };

        let mut report = JobReport::new(job.id());
        report.scenes = (0..config.story.len())
            .map(|index| SceneReport {
                index,
                status: SceneStatus::Pending,
                retries: 0,
                duration: None,
            })
            .collect();
        info!(
            job = job.id(),
            title = %config.title,
            scenes = config.story.len(),
            "starting job"
        );

        match self.drive(config, &job, output, &mut report).await {
            Ok(total) => {
                report.enter(JobState::Done);
                report.output = Some(output.to_path_buf());
                report.total_duration = Some(total);
                report.work_dir = job.finish(true).await;
                info!(output = %output.display(), duration = total, "job done");
            }
            Err(e) => {
                report.fail(&e);
                report.work_dir = job.finish(false).await;
            }
        }
        report
    }

    #[instrument(skip_all, fields(job = job.id()))]
    async fn drive(
        &self,
        config: &StoryConfig,
        job: &RenderJob,
        output: &Path,
        report: &mut JobReport,
    ) -> Result<f64> {
        let settings = &self.settings;

        report.enter(JobState::ResolvingSharedAssets);
        let resolver = AssetResolver::new(
            self.images.clone(),
            self.music.clone(),
            settings.retry.clone(),
            settings.ffprobe.as_str(),
            job.dir(),
            config.style.as_str(),
        );
        let unset = AssetSpec::Unset;
        let (poster_spec, credits_music_spec) = if wants_credits(&config.closing_credits) {
            (
                &config.closing_credits.poster,
                &config.closing_credits.music,
            )
        } else {
            (&unset, &unset)
        };
        let (background, poster, credits_music) = tokio::try_join!(
            resolver.resolve(&config.background_music, AssetKind::Audio, "background_music"),
            resolver.resolve(poster_spec, AssetKind::Image, "credits_poster"),
            resolver.resolve(credits_music_spec, AssetKind::Audio, "credits_music"),
        )?;

        report.enter(JobState::GeneratingScenes);
        let assets = self.generate_scenes(config, job.dir(), report).await?;

        report.enter(JobState::Synchronizing);
        let sync = CaptionSynchronizer::new(settings.caption_weight_exponent, settings.words_per_cue);
        let scenes = assets
            .into_iter()
            .zip(&config.story)
            .map(|(assets, text)| {
                let captions = sync.synchronize(
                    text,
                    &assets.narration,
                    config.caption_style,
                    assets.word_timings.as_deref(),
                )?;
                Ok(Scene {
                    index: assets.index,
                    text: text.clone(),
                    image: assets.image,
                    narration: assets.narration,
                    duration: assets.duration,
                    captions,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        report.enter(JobState::BuildingTimeline);
        let timeline = timeline::build(scenes, background)?;

        report.enter(JobState::Rendering);
        let assembler = VideoAssembler::new(self.encoder.clone(), settings);
        let body = assembler.render(&timeline, job.dir()).await?;
        let mut total = timeline.total_duration;

        let finished: PathBuf = match poster {
            Some(poster) => {
                report.enter(JobState::BuildingCredits);
                let builder = CreditsBuilder::new(self.encoder.clone(), settings);
                let segment = builder
                    .build(
                        &poster,
                        credits_music.as_ref(),
                        &config.title,
                        config.closing_credits.lyrics.as_deref(),
                        config.caption_style,
                        job.dir(),
                    )
                    .await?;
                let with_credits = job.dir().join("final.mp4");
                assembler.append(&body, &segment.video, &with_credits).await?;
                total += segment.duration;
                with_credits
            }
            None => body,
        };

        report.enter(JobState::Assembled);
        commit_output(&finished, output).await?;
        Ok(total)
    }

    /// Generate every scene with at most `concurrency` in flight. The first
    /// failure stops the stream, which drops and so cancels the rest.
    async fn generate_scenes(
        &self,
        config: &StoryConfig,
        job_dir: &Path,
        report: &mut JobReport,
    ) -> Result<Vec<SceneAssets>> {
        let generator = SceneAssetGenerator::new(
            self.images.clone(),
            self.narrator.clone(),
            self.settings.retry.clone(),
            self.settings.ffprobe.as_str(),
            job_dir,
        );
        let generator = &generator;
        let style = config.style.as_str();

        let mut pending = stream::iter(config.story.iter().enumerate())
            .map(move |(index, text)| generator.generate(index, text, style))
            .buffer_unordered(self.settings.concurrency.max(1));

        let mut done: Vec<Option<SceneAssets>> = config.story.iter().map(|_| None).collect();
        let mut failure = None;
        while let Some(outcome) = pending.next().await {
            let entry = &mut report.scenes[outcome.index];
            entry.retries = outcome.retries;
            match outcome.result {
                Ok(assets) => {
                    entry.status = SceneStatus::Generated;
                    entry.duration = Some(assets.duration);
                    done[outcome.index] = Some(assets);
                }
                Err(e) => {
                    entry.status = SceneStatus::Failed;
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(pending);

        if let Some(e) = failure {
            return Err(e);
        }
        done.into_iter()
            .enumerate()
            .map(|(index, assets)| {
                assets.ok_or_else(|| {
                    TtvError::RenderError(format!("scene {index} produced no assets"))
                })
            })
            .collect()
    }
}
