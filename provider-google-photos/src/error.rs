//! Error types for Google Photos provider

use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpResponse;
use std::time::Duration;
use thiserror::Error;

/// Google Photos provider errors
#[derive(Error, Debug)]
pub enum GooglePhotosError {
    /// Authentication failed or token is invalid
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// API request returned an error
    #[error("Google Photos API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {message}")]
    RateLimitExceeded {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Server-side failure worth retrying
    #[error("Google Photos service unavailable (status {status_code}): {message}")]
    ServiceUnavailable { status_code: u16, message: String },

    #[error("Media item not found: {item_id}")]
    ItemNotFound { item_id: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("{0} is not supported by the Photos Library API")]
    Unsupported(&'static str),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Google Photos operations
pub type Result<T> = std::result::Result<T, GooglePhotosError>;

impl GooglePhotosError {
    /// Classify a non-2xx response.
    pub fn from_response(response: &HttpResponse) -> Self {
        let message = String::from_utf8_lossy(&response.body).trim().to_string();
        match response.status {
            401 | 403 => GooglePhotosError::AuthenticationFailed(message),
            429 => GooglePhotosError::RateLimitExceeded {
                message,
                retry_after: response.retry_after(),
            },
            status @ 500..=599 => GooglePhotosError::ServiceUnavailable {
                status_code: status,
                message,
            },
            status => GooglePhotosError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

impl From<GooglePhotosError> for BridgeError {
    fn from(error: GooglePhotosError) -> Self {
        match error {
            GooglePhotosError::AuthenticationFailed(msg) => BridgeError::Auth(msg),
            GooglePhotosError::RateLimitExceeded {
                message,
                retry_after,
            } => BridgeError::RateLimited {
                message,
                retry_after,
            },
            error @ GooglePhotosError::ServiceUnavailable { .. } => {
                BridgeError::Transient(error.to_string())
            }
            GooglePhotosError::ItemNotFound { item_id } => BridgeError::NotFound(item_id),
            GooglePhotosError::BridgeError(e) => e,
            other => BridgeError::Permanent(other.to_string()),
        }
    }
}
