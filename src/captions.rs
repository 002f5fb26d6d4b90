//! Caption cues for one scene's narration, and the SRT file they end up in.
//!
//! Every track produced here partitions `[0, duration]` exactly: cues are
//! contiguous, never overlap and the last one ends on the narration length.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;
use tracing::debug;

use crate::asset::ResolvedAsset;
use crate::capability::WordTiming;
use crate::config::CaptionStyle;
use crate::error::{Result, TtvError};

static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("static regex"));
static WORD_CHAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\w").expect("static regex"));

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionCue {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptionTrack {
    pub cues: Vec<CaptionCue>,
}

impl CaptionTrack {
    /// The same cues moved `offset` seconds later.
    pub fn shifted(&self, offset: f64) -> Vec<CaptionCue> {
        self.cues
            .iter()
            .map(|c| CaptionCue {
                text: c.text.clone(),
                start: c.start + offset,
                end: c.end + offset,
            })
            .collect()
    }

    pub fn end(&self) -> f64 {
        self.cues.last().map_or(0.0, |c| c.end)
    }
}

#[derive(Debug, Clone)]
pub struct CaptionSynchronizer {
    /// Exponent applied to a token's length to get its share of time.
    pub weight_exponent: f64,
    pub words_per_cue: usize,
}

impl Default for CaptionSynchronizer {
    fn default() -> Self {
        Self {
            weight_exponent: 1.0,
            words_per_cue: 1,
        }
    }
}

impl CaptionSynchronizer {
    pub fn new(weight_exponent: f64, words_per_cue: usize) -> Self {
        Self {
            weight_exponent,
            words_per_cue: words_per_cue.max(1),
        }
    }

    pub fn synchronize(
        &self,
        text: &str,
        narration: &ResolvedAsset,
        style: CaptionStyle,
        alignment: Option<&[WordTiming]>,
    ) -> Result<CaptionTrack> {
        let duration = narration.duration.ok_or_else(|| {
            TtvError::RenderError(format!(
                "narration {} has no measured duration",
                narration.path.display()
            ))
        })?;
        Ok(self.track_for(text, duration, style, alignment))
    }

    /// Pure core of [`synchronize`](Self::synchronize).
    pub fn track_for(
        &self,
        text: &str,
        duration: f64,
        style: CaptionStyle,
        alignment: Option<&[WordTiming]>,
    ) -> CaptionTrack {
        let track = match style {
            CaptionStyle::Static => CaptionTrack {
                cues: vec![CaptionCue {
                    text: text.trim().to_string(),
                    start: 0.0,
                    end: duration,
                }],
            },
            CaptionStyle::Dynamic => {
                let words = match alignment {
                    Some(timings) if usable_alignment(timings) => aligned(timings, duration),
                    _ => proportional(text, duration, self.weight_exponent),
                };
                group(words, self.words_per_cue)
            }
        };
        debug!(cues = track.cues.len(), duration, "caption track built");
        track
    }
}

fn token_weight(token: &str, exponent: f64) -> f64 {
    let chars = WORD_CHAR.find_iter(token).count().max(1);
    (chars as f64).powf(exponent)
}

/// Time shared out by token length; rounding residue goes to the last cue.
fn proportional(text: &str, duration: f64, exponent: f64) -> Vec<CaptionCue> {
    let tokens: Vec<&str> = TOKEN.find_iter(text).map(|m| m.as_str()).collect();
    if tokens.is_empty() {
        return vec![CaptionCue {
            text: String::new(),
            start: 0.0,
            end: duration,
        }];
    }

    let weights: Vec<f64> = tokens.iter().map(|t| token_weight(t, exponent)).collect();
    let total: f64 = weights.iter().sum();
    let mut cues = Vec::with_capacity(tokens.len());
    let mut acc = 0.0;
    let mut start = 0.0;
    for (i, (token, weight)) in tokens.iter().zip(&weights).enumerate() {
        acc += weight;
        let end = if i + 1 == tokens.len() {
            duration
        } else {
            (duration * acc / total).clamp(start, duration)
        };
        cues.push(CaptionCue {
            text: (*token).to_string(),
            start,
            end,
        });
        start = end;
    }
    cues
}

fn usable_alignment(timings: &[WordTiming]) -> bool {
    !timings.is_empty()
        && timings
            .iter()
            .all(|w| w.start.is_finite() && w.end.is_finite())
}

/// Cue boundaries sit halfway through the gap between consecutive words.
fn aligned(timings: &[WordTiming], duration: f64) -> Vec<CaptionCue> {
    let mut cues = Vec::with_capacity(timings.len());
    let mut start = 0.0;
    for (i, word) in timings.iter().enumerate() {
        let end = match timings.get(i + 1) {
            Some(next) => ((word.end + next.start) / 2.0).clamp(start, duration),
            None => duration,
        };
        cues.push(CaptionCue {
            text: word.text.trim().to_string(),
            start,
            end,
        });
        start = end;
    }
    cues
}

fn group(cues: Vec<CaptionCue>, per_cue: usize) -> CaptionTrack {
    if per_cue <= 1 {
        return CaptionTrack { cues };
    }
    let cues = cues
        .chunks(per_cue)
        .filter_map(|chunk| {
            let first = chunk.first()?;
            let last = chunk.last()?;
            let text = chunk
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            Some(CaptionCue {
                text,
                start: first.start,
                end: last.end,
            })
        })
        .collect();
    CaptionTrack { cues }
}

pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let total_min = total_sec / 60;
    let m = total_min % 60;
    let h = total_min / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

fn wrap_text(s: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for word in s.split_whitespace() {
        if !current.is_empty() && current.len() + word.len() + 1 > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Render cues in SubRip format. Cues with no visible text are skipped;
/// their time simply shows nothing.
pub fn render_srt(cues: &[CaptionCue], wrap: usize) -> String {
    let mut out = String::new();
    let mut n = 0;
    for cue in cues {
        let lines = wrap_text(&cue.text, wrap);
        if lines.is_empty() {
            continue;
        }
        n += 1;
        let _ = writeln!(out, "{n}");
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_time(cue.start),
            format_srt_time(cue.end)
        );
        for line in lines {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_partition(track: &CaptionTrack, duration: f64) {
        assert!(!track.cues.is_empty());
        assert_eq!(track.cues[0].start, 0.0);
        for pair in track.cues.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
        for cue in &track.cues {
            assert!(cue.start <= cue.end);
        }
        assert!((track.end() - duration).abs() < EPS);
    }

    #[test]
    fn static_is_one_cue() {
        let track = CaptionSynchronizer::default().track_for(
            " A door opens ",
            3.2,
            CaptionStyle::Static,
            None,
        );
        assert_eq!(
            track.cues,
            vec![CaptionCue {
                text: "A door opens".into(),
                start: 0.0,
                end: 3.2
            }]
        );
    }

    #[test]
    fn dynamic_by_character_length() {
        let track = CaptionSynchronizer::default().track_for(
            "hello world",
            2.0,
            CaptionStyle::Dynamic,
            None,
        );
        assert_eq!(track.cues.len(), 2);
        assert_eq!(track.cues[0].text, "hello");
        assert!((track.cues[0].end - 1.0).abs() < EPS);
        assert_eq!(track.cues[1].text, "world");
        assert_eq!(track.cues[1].end, 2.0);
        assert_partition(&track, 2.0);
    }

    #[test]
    fn residual_lands_on_last_cue() {
        let text = "the quick brown fox jumps over the lazy dog again and again";
        for &duration in &[0.1, 1.0 / 3.0, 7.77, 123.456] {
            let track =
                CaptionSynchronizer::new(0.75, 1).track_for(text, duration, CaptionStyle::Dynamic, None);
            assert_eq!(track.cues.len(), 12);
            assert_partition(&track, duration);
            assert_eq!(track.end(), duration);
        }
    }

    #[test]
    fn alignment_boundaries_split_gaps() {
        let timings = vec![
            WordTiming {
                text: "hello".into(),
                start: 0.2,
                end: 0.8,
            },
            WordTiming {
                text: "world".into(),
                start: 1.0,
                end: 1.6,
            },
        ];
        let track = CaptionSynchronizer::default().track_for(
            "hello world",
            2.0,
            CaptionStyle::Dynamic,
            Some(&timings),
        );
        assert!((track.cues[0].end - 0.9).abs() < EPS);
        assert_partition(&track, 2.0);
    }

    #[test]
    fn overlapping_alignment_stays_monotonic() {
        let timings = vec![
            WordTiming {
                text: "a".into(),
                start: 0.0,
                end: 1.5,
            },
            WordTiming {
                text: "b".into(),
                start: 0.5,
                end: 0.6,
            },
            WordTiming {
                text: "c".into(),
                start: 0.1,
                end: 5.0,
            },
        ];
        let track =
            CaptionSynchronizer::default().track_for("a b c", 1.0, CaptionStyle::Dynamic, Some(&timings));
        assert_partition(&track, 1.0);
    }

    #[test]
    fn non_finite_alignment_falls_back_to_proportional() {
        let timings = vec![
            WordTiming {
                text: "a".into(),
                start: 0.0,
                end: f64::NAN,
            },
            WordTiming {
                text: "b".into(),
                start: 0.5,
                end: 0.7,
            },
            WordTiming {
                text: "c".into(),
                start: 0.8,
                end: f64::INFINITY,
            },
        ];
        let sync = CaptionSynchronizer::default();
        let track = sync.track_for("a b c", 1.0, CaptionStyle::Dynamic, Some(&timings));
        assert_partition(&track, 1.0);
        assert_eq!(
            track,
            sync.track_for("a b c", 1.0, CaptionStyle::Dynamic, None)
        );
    }

    #[test]
    fn grouping_keeps_partition() {
        let track = CaptionSynchronizer::new(1.0, 3).track_for(
            "one two three four five six seven",
            4.0,
            CaptionStyle::Dynamic,
            None,
        );
        assert_eq!(track.cues.len(), 3);
        assert_eq!(track.cues[0].text, "one two three");
        assert_eq!(track.cues[2].text, "seven");
        assert_partition(&track, 4.0);
    }

    #[test]
    fn srt_output() {
        let cues = vec![
            CaptionCue {
                text: "Hello".into(),
                start: 0.0,
                end: 1.25,
            },
            CaptionCue {
                text: "".into(),
                start: 1.25,
                end: 2.0,
            },
            CaptionCue {
                text: "there".into(),
                start: 3661.0,
                end: 3662.5,
            },
        ];
        let srt = render_srt(&cues, 80);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,250\nHello\n\n2\n01:01:01,000 --> 01:01:02,500\nthere\n\n"
        );
    }

    #[test]
    fn long_cue_wraps() {
        assert_eq!(wrap_text("aaa bbb ccc", 7), vec!["aaa bbb", "ccc"]);
    }
}
