//! Error types for the streaming pipeline.
//!
//! None of these ever reach the render callback: producers report them as
//! [`StreamEvent::Error`](crate::streamer::StreamEvent) and the render path
//! degrades to silence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    /// Network fetch failed or returned a non-success status
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stream URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Resampler error: {0}")]
    Resampler(String),
}

impl From<reqwest::Error> for StreamError {
    fn from(err: reqwest::Error) -> Self {
        StreamError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;
