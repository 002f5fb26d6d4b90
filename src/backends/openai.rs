use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::capability::{BackendError, ImageGenerator};

const OPENAI_IMAGES_URL: &str = "https://api.openai.com/v1/images/generations";

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: String,
    n: u8,
    size: &'a str,
    quality: &'a str,
    response_format: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    data: Vec<ImageDatum>,
}

#[derive(Debug, Deserialize)]
struct ImageDatum {
    url: Option<String>,
}

pub fn compose_prompt(text: &str, style: &str) -> String {
    format!("{} in the style of {}", text.trim(), style.trim())
}

fn image_url(body: &str) -> Result<String, BackendError> {
    let parsed: ImageResponse = serde_json::from_str(body)
        .map_err(|e| BackendError::fatal(format!("malformed image response: {e}")))?;
    parsed
        .data
        .into_iter()
        .find_map(|d| d.url)
        .ok_or_else(|| BackendError::fatal("image response carried no URL"))
}

/// Images from the OpenAI images endpoint, downloaded from the returned URL.
#[derive(Debug, Clone)]
pub struct OpenAiImageGenerator {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
    size: String,
}

impl OpenAiImageGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| BackendError::fatal(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: OPENAI_IMAGES_URL.to_string(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate_image(&self, prompt: &str, style: &str, out: &Path) -> Result<(), BackendError> {
        let request = ImageRequest {
            model: &self.model,
            prompt: compose_prompt(prompt, style),
            n: 1,
            size: &self.size,
            quality: "standard",
            response_format: "url",
        };
        debug!(model = %self.model, "requesting image");
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::from_status(status, &body));
        }

        let url = image_url(&body)?;
        let bytes = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        tokio::fs::write(out, &bytes).await?;
        info!(out = %out.display(), bytes = bytes.len(), "image downloaded");
        Ok(())
    }
}
