//! Orders scenes into one time sequence and fits the background music to it.

use crate::asset::ResolvedAsset;
use crate::captions::{CaptionCue, CaptionTrack};
use crate::error::{Result, TtvError};

/// A scene with everything it needs on screen.
#[derive(Debug, Clone)]
pub struct Scene {
    pub index: usize,
    pub text: String,
    pub image: ResolvedAsset,
    pub narration: ResolvedAsset,
    pub duration: f64,
    pub captions: CaptionTrack,
}

#[derive(Debug, Clone)]
pub struct TimedScene {
    pub scene: Scene,
    pub start: f64,
}

impl TimedScene {
    pub fn end(&self) -> f64 {
        self.start + self.scene.duration
    }
}

/// Background music looped `loops` times then cut at `duration`.
#[derive(Debug, Clone)]
pub struct MusicBed {
    pub asset: ResolvedAsset,
    pub loops: u32,
    pub duration: f64,
}

#[derive(Debug, Clone)]
pub struct Timeline {
    pub scenes: Vec<TimedScene>,
    pub music: Option<MusicBed>,
    pub total_duration: f64,
}

impl Timeline {
    /// Captions of every scene, on the timeline's clock.
    pub fn captions(&self) -> Vec<CaptionCue> {
        self.scenes
            .iter()
            .flat_map(|ts| ts.scene.captions.shifted(ts.start))
            .collect()
    }
}

/// How many plays of a `track`-second clip cover `total` seconds.
pub fn loops_needed(track: f64, total: f64) -> u32 {
    if track <= 0.0 || total <= track {
        return 1;
    }
    (total / track).ceil() as u32
}

pub fn build(mut scenes: Vec<Scene>, music: Option<ResolvedAsset>) -> Result<Timeline> {
    if scenes.is_empty() {
        return Err(TtvError::EmptyStory);
    }
    scenes.sort_by_key(|s| s.index);

    let mut start = 0.0;
    let scenes: Vec<TimedScene> = scenes
        .into_iter()
        .map(|scene| {
            let timed = TimedScene { start, scene };
            start = timed.end();
            timed
        })
        .collect();
    let total_duration = start;

    let music = music.map(|asset| {
        let loops = asset
            .duration
            .map_or(1, |len| loops_needed(len, total_duration));
        MusicBed {
            asset,
            loops,
            duration: total_duration,
        }
    });

    Ok(Timeline {
        scenes,
        music,
        total_duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetKind, Provenance};
    use std::path::PathBuf;

    fn asset(name: &str, kind: AssetKind, duration: Option<f64>) -> ResolvedAsset {
        ResolvedAsset {
            path: PathBuf::from(name),
            kind,
            provenance: Provenance::Generated,
            duration,
        }
    }

    fn scene(index: usize, duration: f64) -> Scene {
        Scene {
            index,
            text: format!("scene {index}"),
            image: asset("i.png", AssetKind::Image, None),
            narration: asset("n.wav", AssetKind::Audio, Some(duration)),
            duration,
            captions: CaptionTrack {
                cues: vec![CaptionCue {
                    text: format!("scene {index}"),
                    start: 0.0,
                    end: duration,
                }],
            },
        }
    }

    #[test]
    fn empty_story_is_rejected() {
        assert!(matches!(build(vec![], None), Err(TtvError::EmptyStory)));
    }

    #[test]
    fn scenes_are_contiguous_in_index_order() {
        let tl = build(vec![scene(1, 2.5), scene(0, 3.2)], None).unwrap();
        assert_eq!(tl.scenes[0].scene.index, 0);
        assert_eq!(tl.scenes[0].start, 0.0);
        assert_eq!(tl.scenes[1].start, 3.2);
        assert!((tl.total_duration - 5.7).abs() < 1e-9);
        assert!(tl.music.is_none());

        let cues = tl.captions();
        assert_eq!(cues[1].start, 3.2);
        assert!((cues[1].end - 5.7).abs() < 1e-9);
    }

    #[test]
    fn short_music_is_looped() {
        let music = asset("bg.mp3", AssetKind::Audio, Some(40.0));
        let tl = build(vec![scene(0, 60.0), scene(1, 30.0)], Some(music)).unwrap();
        let bed = tl.music.unwrap();
        assert_eq!(bed.loops, 3);
        assert_eq!(bed.duration, 90.0);
    }

    #[test]
    fn long_music_is_played_once() {
        assert_eq!(loops_needed(200.0, 90.0), 1);
        assert_eq!(loops_needed(45.0, 90.0), 2);
        assert_eq!(loops_needed(0.0, 90.0), 1);
    }
}
