//! Error types for the session core.
//!
//! Each component reports failures through its own enum so callers can tell a
//! local validation problem from a transport fault or a failed side request.

use thiserror::Error;

/// Failures of the persistent command channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to send command: {0}")]
    Send(String),

    #[error("connection lost: {0}")]
    Lost(String),

    #[error("channel task has shut down")]
    Closed,
}

/// Reasons a typed command was not delivered.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("command is empty")]
    Empty,

    #[error("command is {len} characters (max {max})")]
    TooLong { len: usize, max: usize },

    #[error("channel is not connected")]
    NotConnected,

    #[error(transparent)]
    Send(ChannelError),
}

impl SubmitError {
    /// Validation failures never reach the network.
    pub fn is_validation(&self) -> bool {
        matches!(self, SubmitError::Empty | SubmitError::TooLong { .. })
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceError {
    #[error("a voice capture is already in progress")]
    AlreadyListening,
}

/// Failures of the one-shot request/response calls.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(reqwest::StatusCode),

    /// The backend answered with `{"error": ...}`.
    #[error("{0}")]
    Backend(String),

    #[error("unexpected response: {0}")]
    Decode(String),
}
