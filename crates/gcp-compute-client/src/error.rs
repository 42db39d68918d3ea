//! Compute client errors

use thiserror::Error;

/// Errors that can occur when interacting with the compute API
#[derive(Debug, Error)]
pub enum ComputeError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The compute API returned an error
    #[error("Compute API error: {0}")]
    Api(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (invalid or expired access token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found. Expected during existence probes: reconcilers
    /// treat it as "proceed to create" and deletes treat it as success.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ComputeError {
    /// True if this error means the requested resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, ComputeError::NotFound(_))
    }
}
