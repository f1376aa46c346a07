//! Error taxonomy for upload sessions

use thiserror::Error;

/// Result alias used across the upload engine
pub type UploadResult<T> = std::result::Result<T, UploadError>;

/// Transport failure classification (used for logging and retry diagnostics)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    Timeout,
    RateLimit,
    ServerError,
    ClientError,
    NetworkError,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::ClientError => "client_error",
            Self::NetworkError => "network_error",
        }
    }
}

/// Errors produced by an upload session or one of its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Object rejected before any network activity
    #[error("{message}")]
    Validation { message: String },

    /// Network or HTTP failure on a single request
    #[error("{message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// Operation aborted by the session's cancellation token
    #[error("Upload was cancelled")]
    Cancelled,

    /// Block list commit rejected after every block succeeded
    #[error("Failed to commit blocks: {message}")]
    Commit { message: String },

    /// `start` called while another session is still uploading
    #[error("An upload session is already in progress")]
    SessionActive,

    /// Invalid engine configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Reading block bytes from the source object failed
    #[error("Failed to read source: {message}")]
    Source { message: String },
}

impl UploadError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Transport {
            message: message.into(),
            status,
        }
    }

    pub fn http_status(status: u16) -> Self {
        Self::transport(format!("HTTP Error: {}", status), Some(status))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Classify a transport failure; `None` for non-transport errors
    pub fn error_type(&self) -> Option<ErrorType> {
        match self {
            Self::Transport {
                status: Some(status),
                ..
            } => Some(match *status {
                408 => ErrorType::Timeout,
                429 => ErrorType::RateLimit,
                500..=599 => ErrorType::ServerError,
                _ => ErrorType::ClientError,
            }),
            Self::Transport { message, .. } if message.contains("timed out") => {
                Some(ErrorType::Timeout)
            }
            Self::Transport { .. } => Some(ErrorType::NetworkError),
            _ => None,
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(err: std::io::Error) -> Self {
        UploadError::Source {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return UploadError::transport(
                format!("Network error: request timed out ({})", err),
                None,
            );
        }
        match err.status() {
            Some(status) => UploadError::http_status(status.as_u16()),
            None => UploadError::transport(format!("Network error: {}", err), None),
        }
    }
}
