mod args;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use args::Args;
use storyreel::backends::{
    CommandMusicGenerator, OpenAiImageGenerator, PiperNarrator, PlaceholderImageGenerator,
    SunoMusicGenerator,
};
use storyreel::{FfmpegEncoder, ImageGenerator, Orchestrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting story video pipeline");
    let settings = args.settings();

    if !args.piper_model.exists() {
        error!("Piper model not found: {}", args.piper_model.display());
        std::process::exit(1);
    }
    let narrator = Arc::new(PiperNarrator::new(&args.piper_model));

    let images: Arc<dyn ImageGenerator> = if args.skip_generation {
        info!("Skipping image generation; placeholder frames will be used");
        Arc::new(PlaceholderImageGenerator::new(
            settings.ffmpeg.as_str(),
            settings.video_width,
            settings.video_height,
        ))
    } else {
        let key = std::env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY must be set unless --skip-generation is given")?;
        Arc::new(OpenAiImageGenerator::new(key)?)
    };

    let encoder = Arc::new(FfmpegEncoder::new(settings.ffmpeg.as_str()));
    let poll_deadline = settings.retry.call_timeout.mul_f64(0.8);
    let mut orchestrator = Orchestrator::new(images, narrator, encoder, settings);
    match std::env::var("SUNO_API_KEY") {
        Ok(key) => {
            let suno = SunoMusicGenerator::new(key)?.with_deadline(poll_deadline);
            orchestrator = orchestrator.with_music_generator(Arc::new(suno));
        }
        Err(_) => warn!("SUNO_API_KEY not set; hosted music generation disabled"),
    }
    if let Some(program) = &args.music_fallback {
        info!("Local music generator {program} available as fallback");
        orchestrator = orchestrator.with_music_generator(Arc::new(CommandMusicGenerator::new(program)));
    }

    let report = orchestrator.run(&args.config, &args.out).await;

    if let Some(dest) = args.report.as_deref() {
        let json = report.to_json()?;
        if dest == "-" {
            println!("{json}");
        } else {
            tokio::fs::write(dest, json)
                .await
                .with_context(|| format!("failed to write report to {dest}"))?;
        }
    }

    if report.succeeded() {
        info!("Final video written to {}", args.out.display());
        Ok(())
    } else {
        if let Some(failure) = &report.error {
            error!(state = ?failure.state, kind = ?failure.kind, "{}", failure.message);
        }
        if let Some(dir) = &report.work_dir {
            error!("Intermediate files kept in {}", dir.display());
        }
        std::process::exit(1);
    }
}
