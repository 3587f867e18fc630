use serde::Serialize;
use thiserror::Error;

/// Common error type for the twin service with clear taxonomy
#[derive(Error, Debug)]
pub enum Error {
    /// Client request errors (4xx)
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Session storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Completion provider errors
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Completion provider is not configured (missing API key)")]
    ProviderNotConfigured,

    /// Startup and configuration errors
    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO and serialization errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Get HTTP status code for the error
    pub fn status_code(&self) -> u16 {
        match self {
            // 4xx Client Errors
            Error::BadRequest(_) => 400,
            Error::InvalidSessionId(_) => 400,

            // Upstream provider
            Error::Provider(_) => 502,
            Error::ProviderNotConfigured => 503,

            // Internal Errors
            Error::Storage(_) => 500,
            Error::Startup(_) => 500,
            Error::ConfigError(_) => 500,
            Error::Io(_) => 500,
            Error::Serialization(_) => 500,
        }
    }

    /// Get error type for logging and the response body
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::BadRequest(_) => "bad_request",
            Error::InvalidSessionId(_) => "invalid_session_id",
            Error::Storage(_) => "storage_error",
            Error::Provider(_) => "provider_error",
            Error::ProviderNotConfigured => "provider_not_configured",
            Error::Startup(_) => "startup_error",
            Error::ConfigError(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }

    /// Whether the failure came from the client's request rather than the service
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Error response for HTTP API
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Flat error text, kept for clients that read `detail`
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub message: String,
    pub r#type: String,
    pub code: u16,
}

impl From<&Error> for ErrorResponse {
    fn from(err: &Error) -> Self {
        let message = err.to_string();
        ErrorResponse {
            error: ErrorDetail {
                message: message.clone(),
                r#type: err.error_type().to_string(),
                code: err.status_code(),
            },
            request_id: None,
            detail: message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
