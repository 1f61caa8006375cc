use std::path::PathBuf;

use thiserror::Error;
use url::Url;

pub type TailsResult<T> = Result<T, TailsFileError>;

#[derive(Debug, Error)]
pub enum TailsFileError {
    #[error("Cannot read tails file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid tails server base url {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("Cannot build tails upload request: {0}")]
    InvalidRequest(String),
    #[error("Tails server at {url} could not be reached: {cause}")]
    Transport { url: Url, cause: String },
    #[error("Cannot upload tails file, server responded {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl TailsFileError {
    /// Transport failures may succeed on a later attempt, everything else will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, TailsFileError::Transport { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TailsFileError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}
