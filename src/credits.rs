//! Closing-credits segment: the poster on screen, the title over it,
//! optional lyric captions, and either the credits music or silence
//! underneath.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::assembler::CAPTION_WRAP;
use crate::asset::ResolvedAsset;
use crate::captions::{CaptionSynchronizer, render_srt};
use crate::config::{CaptionStyle, ClosingCredits, PipelineSettings};
use crate::error::Result;
use crate::ffmpeg::{
    AUDIO_SAMPLE_RATE, EncodeStep, Encoder, escape_filter_path, fit_filter, format_time,
    output_codec_args, subtitles_filter,
};

#[derive(Debug, Clone)]
pub struct CreditsSegment {
    pub video: PathBuf,
    pub duration: f64,
    pub has_music: bool,
}

/// Credits exist only when a poster is configured. Music on its own is
/// ignored.
pub fn wants_credits(credits: &ClosingCredits) -> bool {
    if !credits.poster.is_unset() {
        return true;
    }
    if !credits.music.is_unset() {
        warn!("closing credits music given without a poster; skipping closing credits");
    }
    false
}

pub struct CreditsBuilder {
    encoder: Arc<dyn Encoder>,
    width: u32,
    height: u32,
    frame_rate: u32,
    font_size: u32,
    default_duration: f64,
    captions: CaptionSynchronizer,
}

impl CreditsBuilder {
    pub fn new(encoder: Arc<dyn Encoder>, settings: &PipelineSettings) -> Self {
        Self {
            encoder,
            width: settings.video_width,
            height: settings.video_height,
            frame_rate: settings.frame_rate,
            font_size: settings.caption_font_size,
            default_duration: settings.credits_duration,
            captions: CaptionSynchronizer::new(
                settings.caption_weight_exponent,
                settings.words_per_cue,
            ),
        }
    }

    /// Length of the segment: the music's length, or the configured default.
    pub fn duration_for(&self, music: Option<&ResolvedAsset>) -> f64 {
        music
            .and_then(|m| m.duration)
            .unwrap_or(self.default_duration)
    }

    /// Render the credits into `dir/credits.mp4`. `lyrics`, when given, are
    /// captioned over the whole segment in `style`.
    pub async fn build(
        &self,
        poster: &ResolvedAsset,
        music: Option<&ResolvedAsset>,
        title: &str,
        lyrics: Option<&str>,
        style: CaptionStyle,
        dir: &Path,
    ) -> Result<CreditsSegment> {
        let duration = self.duration_for(music);
        let video = dir.join("credits.mp4");

        // drawtext reads the title verbatim from a file; nothing in it is
        // expanded or needs escaping.
        let title_file = dir.join("credits_title.txt");
        tokio::fs::write(&title_file, title).await?;
        let mut filter = format!(
            "{},drawtext=textfile={}:expansion=none:fontcolor=white:fontsize={}:box=1:boxcolor=black@0.5:boxborderw=20:x=(w-text_w)/2:y=text_h",
            fit_filter(self.width, self.height),
            escape_filter_path(&title_file),
            self.font_size * 2
        );
        if let Some(lyrics) = lyrics.filter(|l| !l.trim().is_empty()) {
            let track = self.captions.track_for(lyrics, duration, style, None);
            let srt = dir.join("credits.srt");
            tokio::fs::write(&srt, render_srt(&track.cues, CAPTION_WRAP)).await?;
            filter.push(',');
            filter.push_str(&subtitles_filter(&srt, self.font_size));
        }

        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            self.frame_rate.to_string(),
            "-i".into(),
            poster.path.display().to_string(),
        ];
        match music {
            Some(m) => {
                args.push("-i".into());
                args.push(m.path.display().to_string());
            }
            None => {
                args.extend(["-f", "lavfi", "-i"].map(String::from));
                args.push(format!("anullsrc=r={AUDIO_SAMPLE_RATE}:cl=stereo"));
            }
        }
        args.push("-vf".into());
        args.push(filter);
        args.extend(["-map", "0:v:0", "-map", "1:a:0"].map(String::from));
        args.extend(output_codec_args(self.frame_rate));
        args.push("-t".into());
        args.push(format_time(duration));

        self.encoder
            .encode(&EncodeStep::new("closing credits", args, &video))
            .await?;
        info!(duration, has_music = music.is_some(), "credits rendered");
        Ok(CreditsSegment {
            video,
            duration,
            has_music: music.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetKind, Provenance};
    use crate::config::AssetSpec;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        steps: Mutex<Vec<EncodeStep>>,
    }

    #[async_trait]
    impl Encoder for Recorder {
        async fn encode(&self, step: &EncodeStep) -> Result<()> {
            self.steps.lock().unwrap().push(step.clone());
            Ok(())
        }
    }

    fn asset(path: &str, kind: AssetKind, duration: Option<f64>) -> ResolvedAsset {
        ResolvedAsset {
            path: PathBuf::from(path),
            kind,
            provenance: Provenance::Supplied,
            duration,
        }
    }

    #[test]
    fn music_without_poster_is_ignored() {
        let music_only = ClosingCredits {
            music: AssetSpec::Prompt("a ballad".into()),
            ..ClosingCredits::default()
        };
        assert!(!wants_credits(&music_only));
        assert!(!wants_credits(&ClosingCredits::default()));
        let poster_only = ClosingCredits {
            poster: AssetSpec::File("poster.png".into()),
            ..ClosingCredits::default()
        };
        assert!(wants_credits(&poster_only));
    }

    #[tokio::test]
    async fn silent_credits_use_default_duration() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let builder = CreditsBuilder::new(recorder.clone(), &PipelineSettings::default());
        let poster = asset("p.png", AssetKind::Image, None);
        let seg = builder
            .build(&poster, None, "The Door", None, CaptionStyle::Static, dir.path())
            .await
            .unwrap();
        assert_eq!(seg.duration, 5.0);
        assert!(!seg.has_music);
        assert_eq!(seg.video, dir.path().join("credits.mp4"));

        let steps = recorder.steps.lock().unwrap();
        let args = &steps[0].args;
        assert!(args.contains(&"anullsrc=r=48000:cl=stereo".to_string()));
        assert!(!args.iter().any(|a| a.contains("subtitles=")));
        assert!(!dir.path().join("credits.srt").exists());
    }

    #[tokio::test]
    async fn title_is_drawn_verbatim_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let builder = CreditsBuilder::new(recorder.clone(), &PipelineSettings::default());
        let poster = asset("p.png", AssetKind::Image, None);
        builder
            .build(&poster, None, "100% Love: it's", None, CaptionStyle::Static, dir.path())
            .await
            .unwrap();

        let title_file = dir.path().join("credits_title.txt");
        assert_eq!(std::fs::read_to_string(&title_file).unwrap(), "100% Love: it's");
        let steps = recorder.steps.lock().unwrap();
        let filter = steps[0].args.iter().find(|a| a.contains("drawtext")).unwrap();
        assert!(filter.contains(&format!("textfile={}", escape_filter_path(&title_file))));
        assert!(filter.contains("expansion=none"));
        assert!(!filter.contains("100%"));
    }

    #[tokio::test]
    async fn credits_last_as_long_as_their_music() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let builder = CreditsBuilder::new(recorder.clone(), &PipelineSettings::default());
        let poster = asset("p.png", AssetKind::Image, None);
        let music = asset("m.mp3", AssetKind::Audio, Some(12.5));
        let seg = builder
            .build(&poster, Some(&music), "T", None, CaptionStyle::Static, dir.path())
            .await
            .unwrap();
        assert_eq!(seg.duration, 12.5);
        let steps = recorder.steps.lock().unwrap();
        let args = &steps[0].args;
        assert!(args.contains(&"m.mp3".to_string()));
        assert!(args.contains(&"12.500".to_string()));
    }

    #[tokio::test]
    async fn lyrics_are_captioned_in_the_story_style() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let builder = CreditsBuilder::new(recorder.clone(), &PipelineSettings::default());
        let poster = asset("p.png", AssetKind::Image, None);
        let music = asset("m.mp3", AssetKind::Audio, Some(4.0));

        builder
            .build(
                &poster,
                Some(&music),
                "T",
                Some("la la"),
                CaptionStyle::Dynamic,
                dir.path(),
            )
            .await
            .unwrap();
        let srt_path = dir.path().join("credits.srt");
        assert_eq!(
            std::fs::read_to_string(&srt_path).unwrap(),
            "1\n00:00:00,000 --> 00:00:02,000\nla\n\n2\n00:00:02,000 --> 00:00:04,000\nla\n\n"
        );
        {
            let steps = recorder.steps.lock().unwrap();
            let filter = steps[0].args.iter().find(|a| a.contains("drawtext")).unwrap();
            assert!(filter.ends_with(&subtitles_filter(&srt_path, 28)));
        }

        builder
            .build(
                &poster,
                Some(&music),
                "T",
                Some("la la"),
                CaptionStyle::Static,
                dir.path(),
            )
            .await
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(&srt_path).unwrap(),
            "1\n00:00:00,000 --> 00:00:04,000\nla la\n\n"
        );
    }
}
