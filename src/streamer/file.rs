//! Local file stream node with simple read-ahead.

use crate::audio::{PeakMeter, SampleBuffer, StreamDecoder};
use crate::config::Config;
use crate::error::StreamError;

use super::{EventSender, StreamCore, StreamEvent, StreamState, Streamer};

/// Bytes decoded per read-ahead step.
pub const FILE_DECODE_BYTES: usize = 2048;

/// Plays a local file. The whole file is read into the byte queue when the
/// source is set; rendering decodes just ahead of what each period needs.
pub struct FileStreamer {
    core: StreamCore,
    finished: bool,
}

impl FileStreamer {
    pub fn new(
        decoder: Box<dyn StreamDecoder>,
        config: &Config,
        events: impl Into<EventSender>,
    ) -> Self {
        let core = StreamCore::new(
            decoder,
            config.channels,
            config.fade_in_frames(config.render_sample_rate),
            events.into(),
        );
        Self { core, finished: false }
    }

    pub fn buffered_frames(&self) -> usize {
        self.core.buffered_frames()
    }

    pub fn queued_bytes(&self) -> usize {
        self.core.queued_bytes()
    }

    pub fn buffered_seconds(&self) -> f32 {
        self.core.buffered_seconds()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Start playing `source` from contents already read by the caller, so
    /// the file I/O can happen outside whatever lock guards this node.
    pub fn set_source_loaded(&mut self, source: &str, loaded: std::io::Result<Vec<u8>>) {
        self.stop();
        self.core.initialize(source);
        if source.is_empty() {
            return;
        }
        match loaded {
            Ok(bytes) => {
                let sink = self.core.attach_producer();
                sink.on_data(&bytes);
                log::info!("Opened {} ({} bytes)", source, bytes.len());
            }
            Err(e) => {
                let reason = format!("could not open {}: {}", source, StreamError::from(e));
                log::error!("{}", reason);
                self.core.events().emit(StreamEvent::Error(reason));
                self.core.stop();
            }
        }
    }
}

impl Streamer for FileStreamer {
    fn set_source(&mut self, source: &str) {
        let loaded = if source.is_empty() {
            Ok(Vec::new())
        } else {
            std::fs::read(source)
        };
        self.set_source_loaded(source, loaded);
    }

    fn stop(&mut self) {
        self.core.stop();
        self.finished = false;
    }

    fn render(&mut self, _input: &SampleBuffer, out: &mut SampleBuffer, sample_rate: u32) {
        if !self.core.is_streaming() {
            return;
        }

        let needed = self
            .core
            .input_frames_needed(sample_rate, out.frames())
            .max(out.frames());
        while self.core.buffered_frames() < needed {
            if self.core.decode(FILE_DECODE_BYTES) == 0 {
                break;
            }
        }

        self.core.render(out, sample_rate);

        if !self.finished && self.core.buffered_frames() == 0 && self.core.queued_bytes() == 0 {
            self.finished = true;
            log::info!("File stream finished");
            self.core.events().emit(StreamEvent::Finished);
        }
    }

    fn needs_resampling(&self, target_sample_rate: u32) -> bool {
        self.core.needs_resampling(target_sample_rate)
    }

    fn peak_meter(&self) -> PeakMeter {
        self.core.peak_meter()
    }

    fn state(&self) -> StreamState {
        if self.core.is_streaming() {
            StreamState::Streaming
        } else {
            StreamState::Idle
        }
    }
}
