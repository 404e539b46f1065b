//! CircleCI API error types.

use thiserror::Error;

/// Errors from the CircleCI v2 API.
#[derive(Debug, Error)]
pub enum CircleCiError {
    /// The request URL could not be built from the base URL and project.
    #[error("invalid CircleCI URL: {0}")]
    InvalidUrl(String),

    /// The request never produced an HTTP response, or the response body
    /// could not be decoded.
    #[error("CircleCI request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// CircleCI answered with a non-success status.
    ///
    /// `message` is the `message` field of the error body when there is one.
    #[error("{status}: {message}")]
    Api { status: u16, message: String },
}

impl CircleCiError {
    /// The HTTP status CircleCI returned, if it returned one.
    pub fn status(&self) -> Option<u16> {
        match self {
            CircleCiError::Api { status, .. } => Some(*status),
            CircleCiError::Transport(e) => e.status().map(|s| s.as_u16()),
            CircleCiError::InvalidUrl(_) => None,
        }
    }
}
