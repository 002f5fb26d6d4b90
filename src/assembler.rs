//! Renders a [`Timeline`] into a single video file through an [`Encoder`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::captions::render_srt;
use crate::config::PipelineSettings;
use crate::error::Result;
use crate::ffmpeg::{
    EncodeStep, Encoder, fit_filter, format_time, output_codec_args, subtitles_filter,
};
use crate::timeline::{MusicBed, Timeline, TimedScene};

pub(crate) const CAPTION_WRAP: usize = 80;

pub struct VideoAssembler {
    encoder: Arc<dyn Encoder>,
    width: u32,
    height: u32,
    frame_rate: u32,
    font_size: u32,
    music_volume: f32,
}

impl VideoAssembler {
    pub fn new(encoder: Arc<dyn Encoder>, settings: &PipelineSettings) -> Self {
        Self {
            encoder,
            width: settings.video_width,
            height: settings.video_height,
            frame_rate: settings.frame_rate,
            font_size: settings.caption_font_size,
            music_volume: settings.music_volume,
        }
    }

    /// Render `timeline` inside `dir` and return the path of the result.
    pub async fn render(&self, timeline: &Timeline, dir: &Path) -> Result<PathBuf> {
        let segments_dir = dir.join("segments");
        tokio::fs::create_dir_all(&segments_dir).await?;

        let mut list = String::new();
        for timed in &timeline.scenes {
            let name = format!("segment_{:03}.mp4", timed.scene.index);
            let step = self.segment_step(timed, &segments_dir.join(&name));
            self.encoder.encode(&step).await?;
            list.push_str(&format!("file 'segments/{name}'\n"));
        }

        let list_path = dir.join("segments.txt");
        tokio::fs::write(&list_path, list).await?;
        let joined = dir.join("joined.mp4");
        self.encoder
            .encode(&concat_step(&list_path, &joined))
            .await?;

        let srt_path = dir.join("captions.srt");
        tokio::fs::write(&srt_path, render_srt(&timeline.captions(), CAPTION_WRAP)).await?;

        let body = dir.join("body.mp4");
        let step = self.finish_step(
            &joined,
            &srt_path,
            timeline.music.as_ref(),
            timeline.total_duration,
            &body,
        );
        self.encoder.encode(&step).await?;
        info!(
            scenes = timeline.scenes.len(),
            duration = timeline.total_duration,
            "main video rendered"
        );
        Ok(body)
    }

    /// Join `tail` onto the end of `head`, re-encoding both.
    pub async fn append(&self, head: &Path, tail: &Path, out: &Path) -> Result<()> {
        let mut args: Vec<String> = vec!["-y".into(), "-i".into()];
        args.push(head.display().to_string());
        args.push("-i".into());
        args.push(tail.display().to_string());
        args.extend(
            [
                "-filter_complex",
                "[0:v][0:a][1:v][1:a]concat=n=2:v=1:a=1[v][a]",
                "-map",
                "[v]",
                "-map",
                "[a]",
            ]
            .map(String::from),
        );
        args.extend(output_codec_args(self.frame_rate));
        self.encoder
            .encode(&EncodeStep::new("append credits", args, out))
            .await
    }

    fn segment_step(&self, timed: &TimedScene, out: &Path) -> EncodeStep {
        let scene = &timed.scene;
        let mut args: Vec<String> = vec![
            "-y".into(),
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            self.frame_rate.to_string(),
            "-i".into(),
            scene.image.path.display().to_string(),
            "-i".into(),
            scene.narration.path.display().to_string(),
            "-vf".into(),
            fit_filter(self.width, self.height),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
        ];
        args.extend(output_codec_args(self.frame_rate));
        args.push("-t".into());
        args.push(format_time(scene.duration));
        EncodeStep::new(format!("scene {} segment", scene.index), args, out)
    }

    fn finish_step(
        &self,
        joined: &Path,
        srt: &Path,
        music: Option<&MusicBed>,
        total: f64,
        out: &Path,
    ) -> EncodeStep {
        let mut args: Vec<String> = vec!["-y".into(), "-i".into(), joined.display().to_string()];
        let mut graph = format!("[0:v]{}[v]", subtitles_filter(srt, self.font_size));
        let audio_label = match music {
            Some(bed) => {
                args.push("-stream_loop".into());
                args.push(bed.loops.saturating_sub(1).to_string());
                args.push("-i".into());
                args.push(bed.asset.path.display().to_string());
                graph.push_str(&format!(
                    ";[1:a]atrim=0:{},asetpts=PTS-STARTPTS,volume={:.2}[bg]\
                     ;[0:a][bg]amix=inputs=2:duration=first:normalize=0:dropout_transition=0[a]",
                    format_time(bed.duration),
                    self.music_volume
                ));
                "[a]"
            }
            None => "0:a",
        };
        args.push("-filter_complex".into());
        args.push(graph);
        args.extend(["-map", "[v]", "-map", audio_label].map(String::from));
        args.extend(output_codec_args(self.frame_rate));
        args.push("-t".into());
        args.push(format_time(total));
        EncodeStep::new("captions and music", args, out)
    }
}

fn concat_step(list: &Path, out: &Path) -> EncodeStep {
    let args = vec![
        "-y".into(),
        "-f".into(),
        "concat".into(),
        "-safe".into(),
        "0".into(),
        "-i".into(),
        list.display().to_string(),
        "-c".into(),
        "copy".into(),
    ];
    EncodeStep::new("concat segments", args, out)
}
