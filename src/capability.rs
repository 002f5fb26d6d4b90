//! Generation capabilities the pipeline calls but does not own.
//!
//! Each capability has a single call contract. Implementations write their
//! result to the path they are handed and report failures as either
//! transient (worth retrying) or fatal.

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, rate limiting, 5xx-equivalent backend errors.
    Transient,
    /// Invalid prompt, authentication, malformed responses.
    Fatal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Fatal => write!(f, "fatal"),
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("{kind} backend failure: {message}")]
pub struct BackendError {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Transient,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::transient(format!("call timed out after {:.1}s", after.as_secs_f64()))
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::Transient
    }

    /// Classify an HTTP status the way every HTTP backend does.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = format!("HTTP {status}: {body}");
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status.is_server_error()
        {
            Self::transient(message)
        } else {
            Self::fatal(message)
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::transient(err.to_string());
        }
        match err.status() {
            Some(status) => Self::from_status(status, "request failed"),
            None if err.is_decode() => Self::fatal(err.to_string()),
            None => Self::transient(err.to_string()),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::fatal(err.to_string())
    }
}

/// A word and where it is spoken, relative to the start of the clip.
#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub text: String,
    pub start: f64,
    pub end: f64,
}

/// What a narration backend hands back besides the audio file itself.
#[derive(Debug, Clone, Default)]
pub struct NarrationOutput {
    /// Per-word alignment, when the backend can provide it.
    pub word_timings: Option<Vec<WordTiming>>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// File extension of the images this backend writes.
    fn extension(&self) -> &'static str {
        "png"
    }

    async fn generate_image(&self, prompt: &str, style: &str, out: &Path)
    -> Result<(), BackendError>;
}

#[async_trait]
pub trait NarrationSynthesizer: Send + Sync {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, text: &str, out: &Path) -> Result<NarrationOutput, BackendError>;
}

#[async_trait]
pub trait MusicGenerator: Send + Sync {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn generate_music(&self, prompt: &str, out: &Path) -> Result<(), BackendError>;
}
