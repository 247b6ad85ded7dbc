//! Error types for segue
//!
//! Defines the playback-core error taxonomy using thiserror for clear error
//! propagation. `Cancelled` is an internal control-flow signal and must never
//! reach a user-facing surface; the resolution pipeline converts it to an
//! empty result before returning.

use thiserror::Error;

/// Main error type for the playback core
#[derive(Error, Debug)]
pub enum Error {
    /// No playable URL exists for any source or quality
    #[error("No playable source: {0}")]
    NotFound(String),

    /// Upstream source plugin is rate-limiting requests
    #[error("Rate limited by source: {0}")]
    TooManyRequests(String),

    /// Request superseded by a newer one; not user-visible
    #[error("Request cancelled")]
    Cancelled,

    /// Sink-level decode or network failure
    #[error("Media error: {0}")]
    Media(String),

    /// Operation attempted in a state that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures worth a quality/source fallback attempt.
    ///
    /// Rate limiting gets a timed retry instead, and a cancellation means
    /// nobody is waiting for the answer any more.
    pub fn is_fallback_worthy(&self) -> bool {
        !matches!(self, Error::TooManyRequests(_) | Error::Cancelled)
    }
}

/// Convenience Result type using the segue Error
pub type Result<T> = std::result::Result<T, Error>;
