use thiserror::Error;

/// Errors raised by the HTTP facade.
///
/// Only session creation and client construction surface these; every other
/// endpoint folds failures into an [`crate::ApiResponse`].
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("POST /session failed {status}: {body}")]
    SessionCreation { status: u16, body: String },

    #[error("POST /session returned no session id ({status})")]
    MissingSessionId { status: u16 },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid API base URL '{url}': {message}")]
    InvalidBaseUrl { url: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ApiError {
    /// HTTP status attached to the error, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::SessionCreation { status, .. } | Self::MissingSessionId { status } => {
                Some(*status)
            }
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::InvalidBaseUrl { .. } | Self::Stream(_) => None,
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    PathError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_creation_message_includes_status_and_body() {
        let err = ApiError::SessionCreation {
            status: 502,
            body: "no body".to_string(),
        };
        assert_eq!(err.to_string(), "POST /session failed 502: no body");
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn test_stream_error_has_no_status() {
        assert_eq!(ApiError::Stream("eof".into()).status(), None);
    }
}
