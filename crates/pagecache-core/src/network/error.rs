use thiserror::Error;

/// Why a fetch produced no response at all.
///
/// HTTP error statuses are not errors here; a 404 or 500 is still a response.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Network error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}
