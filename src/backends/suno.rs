use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::capability::{BackendError, MusicGenerator};

const SUNO_API: &str = "https://api.sunoaiapi.com/api/v1";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
/// Polling budget; must stay inside the per-call timeout.
const DEFAULT_DEADLINE: Duration = Duration::from_secs(240);

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(default)]
    data: Vec<StartedSong>,
}

#[derive(Debug, Deserialize)]
struct StartedSong {
    song_id: String,
}

#[derive(Debug, Deserialize)]
struct SongStatus {
    id: String,
    #[serde(default)]
    status: String,
    audio_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SongState {
    Working(String),
    Complete(String),
}

fn start_body(prompt: &str, seconds: u32, model: &str) -> serde_json::Value {
    json!({
        "gpt_description_prompt": format!("Create a {prompt} that is exactly {seconds} seconds long"),
        "make_instrumental": true,
        "mv": model,
    })
}

fn song_id(body: &str) -> Result<String, BackendError> {
    let parsed: StartResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::fatal(format!("malformed music start response: {e}")))?;
    parsed
        .data
        .into_iter()
        .next()
        .map(|s| s.song_id)
        .ok_or_else(|| BackendError::fatal("music start response carried no song id"))
}

fn song_state(body: &str, id: &str) -> Result<SongState, BackendError> {
    let songs: Vec<SongStatus> = serde_json::from_str(body)
        .map_err(|e| BackendError::fatal(format!("malformed music status response: {e}")))?;
    let Some(song) = songs.into_iter().find(|s| s.id == id) else {
        return Ok(SongState::Working("queued".to_string()));
    };
    match song.status.as_str() {
        "complete" => song
            .audio_url
            .map(SongState::Complete)
            .ok_or_else(|| BackendError::fatal(format!("song {id} complete without audio"))),
        "error" => Err(BackendError::fatal(format!("music generation of {id} failed"))),
        other => Ok(SongState::Working(other.to_string())),
    }
}

/// Instrumental music from the Suno gateway: start a job, poll it, download.
#[derive(Debug, Clone)]
pub struct SunoMusicGenerator {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    seconds: u32,
    poll_interval: Duration,
    max_polls: u32,
}

fn poll_budget(deadline: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    ((deadline.as_secs_f64() / interval.as_secs_f64()).floor() as u32).max(1)
}

impl SunoMusicGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BackendError::fatal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: SUNO_API.to_string(),
            model: "chirp-v3-5".to_string(),
            seconds: 30,
            poll_interval: POLL_INTERVAL,
            max_polls: poll_budget(DEFAULT_DEADLINE, POLL_INTERVAL),
        })
    }

    /// Stop polling once `deadline` worth of polls has been spent. Keep it
    /// below the retry policy's call timeout.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.max_polls = poll_budget(deadline, self.poll_interval);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_text(&self, url: &str) -> Result<String, BackendError> {
        let response = self
            .client
            .get(url)
            .header("api-key", &self.api_key)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::from_status(status, &body));
        }
        Ok(body)
    }
}

#[async_trait]
impl MusicGenerator for SunoMusicGenerator {
    async fn generate_music(&self, prompt: &str, out: &Path) -> Result<(), BackendError> {
        let response = self
            .client
            .post(format!("{}/gateway/generate/gpt_desc", self.base_url))
            .header("api-key", &self.api_key)
            .json(&start_body(prompt, self.seconds, &self.model))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::from_status(status, &body));
        }
        let id = song_id(&body)?;
        info!(song = %id, "music job started");

        let query = format!("{}/gateway/query?ids={id}", self.base_url);
        for poll in 1..=self.max_polls {
            let body = self.get_text(&query).await?;
            match song_state(&body, &id)? {
                SongState::Complete(url) => {
                    let bytes = self
                        .client
                        .get(&url)
                        .send()
                        .await?
                        .error_for_status()?
                        .bytes()
                        .await?;
                    tokio::fs::write(out, &bytes).await?;
                    info!(song = %id, out = %out.display(), "music downloaded");
                    return Ok(());
                }
                SongState::Working(state) => {
                    debug!(song = %id, poll, state = %state, "music still generating");
                    sleep(self.poll_interval).await;
                }
            }
        }
        Err(BackendError::transient(format!(
            "song {id} not complete after {} polls",
            self.max_polls
        )))
    }
}
