use std::convert::From;

use tails_file_service::TailsFileError;

use crate::error::*;

impl From<serde_json::Error> for AgentError {
    fn from(serde_err: serde_json::Error) -> AgentError {
        let kind = AgentErrorKind::SerializationError;
        let message = format!("(De)serialization failed; err: {:?}", serde_err.to_string());
        AgentError { message, kind }
    }
}

impl From<TailsFileError> for AgentError {
    fn from(err: TailsFileError) -> AgentError {
        let kind = match err {
            TailsFileError::Transport { .. } => AgentErrorKind::TailsUploadTransport,
            TailsFileError::Rejected { .. } => AgentErrorKind::TailsUploadRejected,
            TailsFileError::Io { .. } => AgentErrorKind::IoError,
            TailsFileError::InvalidBaseUrl { .. } => AgentErrorKind::InvalidConfiguration,
            TailsFileError::InvalidRequest(_) => AgentErrorKind::InvalidArguments,
        };
        error!("Tails file error: {}", err);
        let message = format!("Tails file error; err: {}", err);
        AgentError { message, kind }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        let kind = AgentErrorKind::IoError;
        let message = format!("IO error; err: {:?}", err.to_string());
        AgentError { message, kind }
    }
}

impl From<url::ParseError> for AgentError {
    fn from(err: url::ParseError) -> Self {
        let kind = AgentErrorKind::InvalidConfiguration;
        let message = format!("Error parsing URL; err: {:?}", err.to_string());
        AgentError { message, kind }
    }
}

impl From<tokio::task::JoinError> for AgentError {
    fn from(err: tokio::task::JoinError) -> Self {
        let kind = AgentErrorKind::GenericAgentError;
        let message = format!("Background task failed; err: {:?}", err.to_string());
        AgentError { message, kind }
    }
}
