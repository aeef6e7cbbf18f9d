//! Stream nodes: render-callback facing sources that buffer, decode and
//! rate-adapt audio pushed by a producer.
//!
//! Every node implements [`Streamer`]. The buffered variants share the
//! [`StreamCore`] helpers; the synthetic test variant bypasses them.

mod engine;
mod file;
mod network;
mod synthetic;

pub use engine::{MAX_BYTES_PER_DECODING, ProducerSink, StreamCore};
pub use file::{FILE_DECODE_BYTES, FileStreamer};
pub use network::{NETWORK_DECODE_BYTES, NetworkStreamer};
pub use synthetic::{Oscillator, TestStreamer};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::audio::{PeakMeter, SampleBuffer};

/// Playback state of a stream node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    /// No source attached.
    Idle,
    /// Accumulating audio below the prebuffer threshold; renders silence.
    Buffering,
    /// Rendering buffered audio.
    Streaming,
}

impl StreamState {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            StreamState::Idle => 0,
            StreamState::Buffering => 1,
            StreamState::Streaming => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => StreamState::Buffering,
            2 => StreamState::Streaming,
            _ => StreamState::Idle,
        }
    }
}

/// Notifications raised by producers, consumed by a UI or logger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Network or file failure. Already buffered audio keeps playing.
    Error(String),
    /// A file source has been rendered to the end.
    Finished,
}

/// Non-blocking sender for [`StreamEvent`]s.
///
/// Events are dropped, with a warning, when the receiver lags behind; the
/// producer and render threads must never wait on a consumer.
#[derive(Debug, Clone, Default)]
pub struct EventSender {
    tx: Option<mpsc::Sender<StreamEvent>>,
}

impl EventSender {
    pub fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sender that discards every event.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: StreamEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.try_send(event) {
            log::warn!("Dropping stream event: {}", e);
        }
    }
}

impl From<mpsc::Sender<StreamEvent>> for EventSender {
    fn from(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self::new(tx)
    }
}

/// Capability set shared by every stream node.
pub trait Streamer {
    /// Stop the current stream and start `source`. An empty source leaves
    /// the node idle.
    fn set_source(&mut self, source: &str);

    /// Stop streaming and release the producer. Safe to call repeatedly.
    fn stop(&mut self);

    /// Mix this node's next `out.frames()` frames into `out` at `sample_rate`.
    /// `input` is the host's input mix; stream nodes ignore it.
    fn render(&mut self, input: &SampleBuffer, out: &mut SampleBuffer, sample_rate: u32);

    /// Whether rendering at `target_sample_rate` goes through the resampler.
    fn needs_resampling(&self, target_sample_rate: u32) -> bool;

    /// Handle on the node's peak meter.
    fn peak_meter(&self) -> PeakMeter;

    fn state(&self) -> StreamState;
}

/// The stream node variants behind one concrete type.
pub enum StreamNode {
    Network(NetworkStreamer),
    File(FileStreamer),
    Synthetic(TestStreamer),
}

impl StreamNode {
    fn inner(&self) -> &dyn Streamer {
        match self {
            StreamNode::Network(node) => node,
            StreamNode::File(node) => node,
            StreamNode::Synthetic(node) => node,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Streamer {
        match self {
            StreamNode::Network(node) => node,
            StreamNode::File(node) => node,
            StreamNode::Synthetic(node) => node,
        }
    }

    /// Whether [`set_source`](Streamer::set_source) reads the source from disk.
    pub fn reads_files(&self) -> bool {
        matches!(self, StreamNode::File(_))
    }

    /// Like [`set_source`](Streamer::set_source), with file contents read by
    /// the caller. Nodes that don't read files ignore `loaded`.
    pub fn set_source_loaded(&mut self, source: &str, loaded: std::io::Result<Vec<u8>>) {
        match self {
            StreamNode::File(node) => node.set_source_loaded(source, loaded),
            StreamNode::Network(node) => node.set_source(source),
            StreamNode::Synthetic(node) => node.set_source(source),
        }
    }

    /// Decoded audio waiting to be rendered. The synthetic node has none.
    pub fn buffered_seconds(&self) -> f32 {
        match self {
            StreamNode::Network(node) => node.core().buffered_seconds(),
            StreamNode::File(node) => node.buffered_seconds(),
            StreamNode::Synthetic(_) => 0.0,
        }
    }
}

impl Streamer for StreamNode {
    fn set_source(&mut self, source: &str) {
        self.inner_mut().set_source(source)
    }

    fn stop(&mut self) {
        self.inner_mut().stop()
    }

    fn render(&mut self, input: &SampleBuffer, out: &mut SampleBuffer, sample_rate: u32) {
        self.inner_mut().render(input, out, sample_rate)
    }

    fn needs_resampling(&self, target_sample_rate: u32) -> bool {
        self.inner().needs_resampling(target_sample_rate)
    }

    fn peak_meter(&self) -> PeakMeter {
        self.inner().peak_meter()
    }

    fn state(&self) -> StreamState {
        self.inner().state()
    }
}

impl From<NetworkStreamer> for StreamNode {
    fn from(node: NetworkStreamer) -> Self {
        StreamNode::Network(node)
    }
}

impl From<FileStreamer> for StreamNode {
    fn from(node: FileStreamer) -> Self {
        StreamNode::File(node)
    }
}

impl From<TestStreamer> for StreamNode {
    fn from(node: TestStreamer) -> Self {
        StreamNode::Synthetic(node)
    }
}
