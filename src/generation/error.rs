use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generative backend configured")]
    NotConfigured,
    #[error("missing required environment variable: {0}")]
    MissingEnvironment(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend returned empty or unusable text")]
    Empty,
    #[error("image encoding failed: {0}")]
    Image(String),
    #[error("HTTP request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP status {status} from {provider}: {message}")]
    HttpStatus {
        provider: &'static str,
        status: reqwest::StatusCode,
        message: String,
    },
    #[error("unable to parse response from {provider}: {message}")]
    ResponseParse {
        provider: &'static str,
        message: String,
    },
    #[error("I/O error")]
    Io(#[from] io::Error),
}

impl GenerationError {
    pub fn http(provider: &'static str, source: reqwest::Error) -> Self {
        Self::Http { provider, source }
    }

    pub fn status(provider: &'static str, status: reqwest::StatusCode, message: String) -> Self {
        Self::HttpStatus {
            provider,
            status,
            message,
        }
    }

    pub fn response(provider: &'static str, message: impl Into<String>) -> Self {
        Self::ResponseParse {
            provider,
            message: message.into(),
        }
    }

    /// Whether another attempt against the same provider could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { .. } | Self::Timeout(_) | Self::Empty => true,
            Self::HttpStatus { status, .. } => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}
