//! Error types for backend access and local file saves.

use thiserror::Error;

/// Failures while talking to the analytics backend.
///
/// Any of these ends the current turn with a network notice. The full
/// error goes to the log; the transcript only ever sees [`diagnostic`].
///
/// [`diagnostic`]: BackendError::diagnostic
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("could not connect to backend: {0}")]
    Connect(String),

    /// The request did not complete within the configured timeout.
    #[error("backend request timed out")]
    Timeout,

    /// The request failed mid-flight (dropped connection, bad body, ...).
    #[error("backend request failed: {0}")]
    Request(String),

    /// The backend answered with something that is not a usable reply.
    #[error("malformed backend reply: {0}")]
    MalformedReply(String),

    /// Local I/O failure while driving the request.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackendError {
    /// Short label safe to show to the user.
    pub fn diagnostic(&self) -> &'static str {
        match self {
            BackendError::Connect(_) => "connection failed",
            BackendError::Timeout => "timeout",
            BackendError::Request(_) => "request failed",
            BackendError::MalformedReply(_) => "malformed reply",
            BackendError::Io(_) => "i/o error",
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout
        } else if err.is_connect() {
            BackendError::Connect(err.to_string())
        } else if err.is_decode() {
            BackendError::MalformedReply(err.to_string())
        } else {
            BackendError::Request(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::MalformedReply(err.to_string())
    }
}

/// Failures while writing a download or export to disk.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("file name {0:?} has no usable final component")]
    EmptyFilename(String),

    #[error("could not save download: {0}")]
    Io(#[from] std::io::Error),
}
