//! room_stream - buffered audio streaming with rate adaptation
//!
//! Producers push compressed bytes into a stream node; the host's render
//! callback pulls decoded, resampled audio out of it one period at a time.

pub mod audio;
pub mod config;
pub mod error;
pub mod render_loop;
pub mod streamer;
pub mod transport;

pub use config::Config;
pub use error::{Result, StreamError};
pub use streamer::{StreamEvent, StreamNode, StreamState, Streamer};
