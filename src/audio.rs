use hound::WavReader;
use std::path::Path;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, TtvError};

pub fn wav_duration_seconds(path: &Path) -> Result<f64> {
    let reader = WavReader::open(path).map_err(|e| {
        TtvError::RenderError(format!("cannot read WAV {}: {e}", path.display()))
    })?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    Ok(frames / spec.sample_rate as f64)
}

pub async fn probe_duration_seconds(path: &Path, ffprobe: &str) -> Result<f64> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-show_entries", "format=duration"])
        .args(["-of", "default=noprint_wrappers=1:nokey=1"])
        .arg(path)
        .output()
        .await
        .map_err(|e| TtvError::RenderError(format!("failed to run {ffprobe}: {e}")))?;
    if !output.status.success() {
        return Err(TtvError::RenderError(format!(
            "{ffprobe} failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    text.trim().parse::<f64>().map_err(|e| {
        TtvError::RenderError(format!("unparseable duration {:?}: {e}", text.trim()))
    })
}

/// Length of an audio file in seconds. WAV is read from its header,
/// anything else goes through ffprobe.
pub async fn audio_duration(path: &Path, ffprobe: &str) -> Result<f64> {
    let is_wav = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
    let duration = if is_wav {
        wav_duration_seconds(path)?
    } else {
        probe_duration_seconds(path, ffprobe).await?
    };
    debug!(path = %path.display(), duration, "measured audio");
    if !(duration.is_finite() && duration > 0.0) {
        return Err(TtvError::RenderError(format!(
            "audio {} has no measurable length",
            path.display()
        )));
    }
    Ok(duration)
}

#[cfg(test)]
pub(crate) fn write_silence(path: &Path, seconds: f64) -> std::io::Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 8000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(std::io::Error::other)?;
    for _ in 0..(seconds * 8000.0).round() as usize {
        writer.write_sample(0i16).map_err(std::io::Error::other)?;
    }
    writer.finalize().map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wav_length_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_silence(&path, 1.5).unwrap();
        let d = audio_duration(&path, "ffprobe").await.unwrap();
        assert!((d - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn empty_wav_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_silence(&path, 0.0).unwrap();
        assert!(audio_duration(&path, "ffprobe").await.is_err());
    }
}
