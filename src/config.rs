//! Story configuration document and pipeline settings.
//!
//! The story document is JSON. Parsing goes through a permissive raw record
//! so that a missing field produces an error naming it, and so that unknown
//! fields are ignored.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TtvError};
use crate::retry::RetryPolicy;

/// Where an asset comes from: a supplied file, a generation prompt, or nowhere.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AssetSpec {
    File(PathBuf),
    Prompt(String),
    #[default]
    Unset,
}

impl AssetSpec {
    pub fn is_unset(&self) -> bool {
        matches!(self, AssetSpec::Unset)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptionStyle {
    #[default]
    Static,
    Dynamic,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClosingCredits {
    pub music: AssetSpec,
    pub poster: AssetSpec,
    /// Lyrics or credits text captioned over the credits segment.
    pub lyrics: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryConfig {
    pub style: String,
    pub story: Vec<String>,
    pub title: String,
    pub caption_style: CaptionStyle,
    pub background_music: AssetSpec,
    pub closing_credits: ClosingCredits,
}

#[derive(Debug, Deserialize)]
struct RawAssetSpec {
    file: Option<String>,
    prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClosingCredits {
    music: Option<RawAssetSpec>,
    poster: Option<RawAssetSpec>,
    lyrics: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStoryConfig {
    style: Option<String>,
    story: Option<Vec<String>>,
    title: Option<String>,
    caption_style: Option<String>,
    background_music: Option<RawAssetSpec>,
    closing_credits: Option<RawClosingCredits>,
}

fn asset_spec(raw: Option<RawAssetSpec>, field: &str) -> Result<AssetSpec> {
    let Some(raw) = raw else {
        return Ok(AssetSpec::Unset);
    };
    let file = raw.file.filter(|f| !f.trim().is_empty());
    let prompt = raw.prompt.filter(|p| !p.trim().is_empty());
    match (file, prompt) {
        (Some(_), Some(_)) => Err(TtvError::config(format!(
            "`{field}` cannot specify both `file` and `prompt`"
        ))),
        (Some(file), None) => Ok(AssetSpec::File(PathBuf::from(file))),
        (None, Some(prompt)) => Ok(AssetSpec::Prompt(prompt)),
        (None, None) => Ok(AssetSpec::Unset),
    }
}

fn caption_style(raw: Option<String>) -> Result<CaptionStyle> {
    match raw.as_deref() {
        None | Some("static") => Ok(CaptionStyle::Static),
        Some("dynamic") => Ok(CaptionStyle::Dynamic),
        Some(other) => Err(TtvError::config(format!(
            "`caption_style` must be \"static\" or \"dynamic\", got {other:?}"
        ))),
    }
}

impl StoryConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawStoryConfig = serde_json::from_str(text)
            .map_err(|e| TtvError::config(format!("malformed configuration: {e}")))?;

        let style = raw.style.ok_or_else(|| TtvError::missing_field("style"))?;
        let story = raw.story.ok_or_else(|| TtvError::missing_field("story"))?;
        let title = raw.title.ok_or_else(|| TtvError::missing_field("title"))?;

        if story.is_empty() {
            return Err(TtvError::config("`story` must contain at least one scene"));
        }
        if let Some(i) = story.iter().position(|s| s.trim().is_empty()) {
            return Err(TtvError::config(format!("`story[{i}]` is empty")));
        }

        let closing_credits = match raw.closing_credits {
            Some(cc) => ClosingCredits {
                music: asset_spec(cc.music, "closing_credits.music")?,
                poster: asset_spec(cc.poster, "closing_credits.poster")?,
                lyrics: cc.lyrics.filter(|l| !l.trim().is_empty()),
            },
            None => ClosingCredits::default(),
        };

        Ok(Self {
            style,
            story,
            title,
            caption_style: caption_style(raw.caption_style)?,
            background_music: asset_spec(raw.background_music, "background_music")?,
            closing_credits,
        })
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            TtvError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json(&text)
    }
}

/// Knobs of the pipeline itself, independent of any one story.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Scenes generated at the same time.
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Root under which each job creates its own working directory.
    pub work_root: PathBuf,
    pub keep_intermediates: bool,
    pub music_volume: f32,
    /// Length of the credits segment when it has no music of its own.
    pub credits_duration: f64,
    pub video_width: u32,
    pub video_height: u32,
    pub frame_rate: u32,
    pub caption_font_size: u32,
    /// Exponent applied to token length when distributing caption time.
    pub caption_weight_exponent: f64,
    pub words_per_cue: usize,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            work_root: std::env::temp_dir().join("storyreel"),
            keep_intermediates: false,
            music_volume: 0.3,
            credits_duration: 5.0,
            video_width: 1920,
            video_height: 1080,
            frame_rate: 30,
            caption_font_size: 28,
            caption_weight_exponent: 1.0,
            words_per_cue: 1,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

impl PipelineSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.retry.call_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_defaults() {
        let cfg = StoryConfig::from_json(
            r#"{"style":"digital art","story":["A door opens","A light appears"],"title":"T"}"#,
        )
        .unwrap();
        assert_eq!(cfg.story.len(), 2);
        assert_eq!(cfg.caption_style, CaptionStyle::Static);
        assert!(cfg.background_music.is_unset());
        assert!(cfg.closing_credits.poster.is_unset());
    }

    #[test]
    fn missing_field_is_named() {
        let err = StoryConfig::from_json(r#"{"style":"x","title":"T"}"#).unwrap_err();
        assert!(matches!(err, TtvError::ConfigInvalid(_)));
        assert!(err.to_string().contains("`story`"));
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let cfg = StoryConfig::from_json(
            r#"{"style":"x","story":["a"],"title":"T","preloaded_images_dir":"/tmp","extra":1}"#,
        );
        assert!(cfg.is_ok());
    }

    #[test]
    fn asset_specs() {
        let cfg = StoryConfig::from_json(
            r#"{
                "style":"x","story":["a"],"title":"T",
                "caption_style":"dynamic",
                "background_music":{"file":"bg.mp3"},
                "closing_credits":{"music":{"prompt":"a ballad"},"poster":{},"lyrics":"  "}
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.caption_style, CaptionStyle::Dynamic);
        assert_eq!(cfg.background_music, AssetSpec::File(PathBuf::from("bg.mp3")));
        assert_eq!(
            cfg.closing_credits.music,
            AssetSpec::Prompt("a ballad".to_string())
        );
        assert!(cfg.closing_credits.poster.is_unset());
        assert_eq!(cfg.closing_credits.lyrics, None);
    }

    #[test]
    fn credits_lyrics_are_kept() {
        let cfg = StoryConfig::from_json(
            r#"{"style":"x","story":["a"],"title":"T","closing_credits":{"poster":{"file":"p.png"},"lyrics":"la la la"}}"#,
        )
        .unwrap();
        assert_eq!(cfg.closing_credits.lyrics.as_deref(), Some("la la la"));
    }

    #[test]
    fn file_and_prompt_together_rejected() {
        let err = StoryConfig::from_json(
            r#"{"style":"x","story":["a"],"title":"T","background_music":{"file":"a.mp3","prompt":"b"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("background_music"));
    }

    #[test]
    fn bad_caption_style_and_blank_scene() {
        assert!(
            StoryConfig::from_json(r#"{"style":"x","story":["a"],"title":"T","caption_style":"karaoke"}"#)
                .is_err()
        );
        let err = StoryConfig::from_json(r#"{"style":"x","story":["a","  "],"title":"T"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("story[1]"));
        assert!(StoryConfig::from_json(r#"{"style":"x","story":[],"title":"T"}"#).is_err());
    }
}
