use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::capability::BackendError;

#[derive(Debug, Error)]
pub enum TtvError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("asset not found: {path} ({reason})")]
    AssetNotFound { path: PathBuf, reason: String },

    #[error("generation of {what} failed after {attempts} attempt(s): {source}")]
    GenerationFailed {
        what: String,
        attempts: u32,
        #[source]
        source: BackendError,
    },

    #[error("story has no scenes")]
    EmptyStory,

    #[error("render error: {0}")]
    RenderError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error kind as it appears in the job report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    ConfigInvalid,
    AssetNotFound,
    GenerationFailed,
    EmptyStory,
    RenderError,
    Io,
}

impl TtvError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TtvError::ConfigInvalid(_) => ErrorKind::ConfigInvalid,
            TtvError::AssetNotFound { .. } => ErrorKind::AssetNotFound,
            TtvError::GenerationFailed { .. } => ErrorKind::GenerationFailed,
            TtvError::EmptyStory => ErrorKind::EmptyStory,
            TtvError::RenderError(_) => ErrorKind::RenderError,
            TtvError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        TtvError::ConfigInvalid(msg.into())
    }

    pub(crate) fn missing_field(field: &str) -> Self {
        TtvError::ConfigInvalid(format!("missing required field `{field}`"))
    }
}

pub type Result<T> = std::result::Result<T, TtvError>;
