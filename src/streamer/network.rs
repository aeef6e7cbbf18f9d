//! Network stream node with a prebuffering state machine.

use std::sync::Arc;

use url::Url;

use crate::audio::{PeakMeter, SampleBuffer, StreamDecoder};
use crate::config::Config;
use crate::error::StreamError;
use crate::transport::Transport;

use super::{EventSender, StreamCore, StreamEvent, StreamState, Streamer};

/// Bytes decoded per render tick, independent of the period size.
pub const NETWORK_DECODE_BYTES: usize = 4096;

/// Plays a stream pushed by a [`Transport`].
///
/// Playback is withheld until `buffer_seconds` of audio are decoded, which
/// absorbs arrival jitter up front instead of as gaps later. The switch to
/// [`StreamState::Streaming`] is one-way for a session.
pub struct NetworkStreamer {
    core: StreamCore,
    transport: Arc<dyn Transport>,
    state: StreamState,
    buffer_seconds: u32,
    max_buffered_seconds: u32,
}

impl NetworkStreamer {
    pub fn new(
        decoder: Box<dyn StreamDecoder>,
        transport: Arc<dyn Transport>,
        config: &Config,
        events: impl Into<EventSender>,
    ) -> Self {
        let core = StreamCore::new(
            decoder,
            config.channels,
            config.fade_in_frames(config.render_sample_rate),
            events.into(),
        );
        Self {
            core,
            transport,
            state: StreamState::Idle,
            buffer_seconds: config.buffer_seconds,
            max_buffered_seconds: config.max_buffered_seconds.max(config.buffer_seconds),
        }
    }

    /// Frames that must be buffered before playback starts.
    pub fn threshold_frames(&self) -> usize {
        self.buffer_seconds as usize * self.core.sample_rate() as usize
    }

    pub fn buffered_frames(&self) -> usize {
        self.core.buffered_frames()
    }

    pub fn queued_bytes(&self) -> usize {
        self.core.queued_bytes()
    }

    pub fn core(&self) -> &StreamCore {
        &self.core
    }

    fn buffer_full(&self) -> bool {
        let limit = self.max_buffered_seconds as usize * self.core.sample_rate() as usize;
        self.core.buffered_frames() >= limit
    }

    fn connect(&mut self, source: &str) {
        let url = match Url::parse(source) {
            Ok(url) => url,
            Err(e) => {
                let err = StreamError::InvalidUrl {
                    url: source.to_string(),
                    reason: e.to_string(),
                };
                log::error!("{}", err);
                self.core.events().emit(StreamEvent::Error(err.to_string()));
                self.stop();
                return;
            }
        };
        log::info!("connecting in {}", url);
        let sink = self.core.attach_producer();
        let fetch = self.transport.fetch(&url, sink);
        self.core.set_fetch(fetch);
    }
}

impl Streamer for NetworkStreamer {
    fn set_source(&mut self, source: &str) {
        self.stop();
        self.core.initialize(source);
        if source.is_empty() {
            return;
        }
        self.state = StreamState::Buffering;
        self.connect(source);
    }

    fn stop(&mut self) {
        self.core.stop();
        self.state = StreamState::Idle;
    }

    fn render(&mut self, _input: &SampleBuffer, out: &mut SampleBuffer, sample_rate: u32) {
        if self.state == StreamState::Idle {
            return;
        }

        if self.state == StreamState::Streaming {
            let needed = self.core.input_frames_needed(sample_rate, out.frames());
            if self.core.buffered_frames() < needed {
                self.core.decode(NETWORK_DECODE_BYTES);
            }
        }
        // keep filling while buffering, bounded by max_buffered_seconds
        if !self.buffer_full() {
            self.core.decode(NETWORK_DECODE_BYTES);
        }

        log::debug!(
            "Buffered samples: {} bytesToDecode: {}",
            self.core.buffered_frames(),
            self.core.queued_bytes()
        );

        if self.state == StreamState::Buffering
            && self.core.buffered_frames() >= self.threshold_frames()
        {
            log::info!(
                "Prebuffering complete: {} frames at {}Hz",
                self.core.buffered_frames(),
                self.core.sample_rate()
            );
            self.state = StreamState::Streaming;
        }

        if self.state == StreamState::Streaming {
            self.core.render(out, sample_rate);
        } else {
            self.core.peak_meter().zero();
        }
    }

    fn needs_resampling(&self, target_sample_rate: u32) -> bool {
        self.state == StreamState::Streaming && self.core.needs_resampling(target_sample_rate)
    }

    fn peak_meter(&self) -> PeakMeter {
        self.core.peak_meter()
    }

    fn state(&self) -> StreamState {
        self.state
    }
}
