//! Shared streaming engine: byte queue hand-off, chunked decode and the
//! render contract used by the buffered stream nodes.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::audio::{ByteQueue, FadeIn, PeakMeter, Resampler, SampleBuffer, StreamDecoder};
use crate::transport::FetchHandle;

use super::{EventSender, StreamEvent};

/// Upper bound on bytes handed to the decoder in one call, so a single
/// decode never produces an unbounded burst of samples.
pub const MAX_BYTES_PER_DECODING: usize = 2048;

/// State shared between a producer callback and the render path.
#[derive(Debug, Default)]
struct ProducerInput {
    queue: ByteQueue,
    attached: bool,
    /// Bumped on every stop; callbacks carrying an older value are ignored.
    generation: u64,
    error_raised: bool,
}

fn lock(input: &Mutex<ProducerInput>) -> MutexGuard<'_, ProducerInput> {
    input.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Producer-side handle: the on-data / on-error callbacks of one fetch.
///
/// A sink is bound to the session that created it. Once the node is stopped
/// or pointed at another source, the sink goes stale and its callbacks no
/// longer touch the node.
#[derive(Debug, Clone)]
pub struct ProducerSink {
    input: Arc<Mutex<ProducerInput>>,
    generation: u64,
    events: EventSender,
}

impl ProducerSink {
    /// Queue newly arrived bytes. Returns `false` once the sink is stale so
    /// the producer can stop reading.
    pub fn on_data(&self, data: &[u8]) -> bool {
        let mut input = lock(&self.input);
        if !input.attached || input.generation != self.generation {
            return false;
        }
        input.queue.push(data);
        log::debug!("bytes downloaded, bytes to decode: {}", input.queue.len());
        true
    }

    /// Report a transport failure. Raised at most once per session.
    pub fn on_error(&self, reason: &str) {
        {
            let mut input = lock(&self.input);
            if input.generation != self.generation || input.error_raised {
                return;
            }
            input.error_raised = true;
        }
        log::error!("ERROR playing room stream: {}", reason);
        self.events.emit(StreamEvent::Error(reason.to_string()));
    }

    pub fn is_current(&self) -> bool {
        let input = lock(&self.input);
        input.attached && input.generation == self.generation
    }
}

/// Base state and behaviour of the buffered stream nodes.
///
/// The render path exclusively owns the decoder, sample buffer and
/// resampler. Only the byte queue is shared with producers, behind a lock
/// held for the append or the take and never across decoding.
pub struct StreamCore {
    decoder: Box<dyn StreamDecoder>,
    buffered: SampleBuffer,
    input_scratch: SampleBuffer,
    output_scratch: SampleBuffer,
    resampler: Resampler,
    peak: PeakMeter,
    fader: FadeIn,
    input: Arc<Mutex<ProducerInput>>,
    fetch: Option<FetchHandle>,
    streaming: bool,
    events: EventSender,
}

impl StreamCore {
    pub fn new(
        decoder: Box<dyn StreamDecoder>,
        channels: usize,
        fade_in_frames: usize,
        events: EventSender,
    ) -> Self {
        Self {
            decoder,
            buffered: SampleBuffer::new(channels, 0),
            input_scratch: SampleBuffer::new(channels, 0),
            output_scratch: SampleBuffer::new(channels, 0),
            resampler: Resampler::new(),
            peak: PeakMeter::new(),
            fader: FadeIn::new(fade_in_frames),
            input: Arc::new(Mutex::new(ProducerInput::default())),
            fetch: None,
            streaming: false,
            events,
        }
    }

    /// Stop the current stream: restart the fade-in, drop decoder leftovers,
    /// release the producer and discard everything buffered.
    pub fn stop(&mut self) {
        if self.streaming {
            log::debug!("stopping room stream");
        }
        self.fader.reset();
        self.decoder.reset();
        {
            let mut input = lock(&self.input);
            input.generation = input.generation.wrapping_add(1);
            input.attached = false;
            input.error_raised = false;
            input.queue.clear();
        }
        if let Some(mut fetch) = self.fetch.take() {
            fetch.cancel();
        }
        self.buffered.clear();
        self.streaming = false;
    }

    /// Mark the node as streaming when `source` names something to play.
    pub fn initialize(&mut self, source: &str) {
        self.streaming = !source.is_empty();
    }

    /// Attach a producer for the current session and return its callbacks.
    pub fn attach_producer(&mut self) -> ProducerSink {
        let generation = {
            let mut input = lock(&self.input);
            input.attached = true;
            input.error_raised = false;
            input.generation
        };
        ProducerSink {
            input: Arc::clone(&self.input),
            generation,
            events: self.events.clone(),
        }
    }

    /// Keep the in-flight fetch so `stop` can cancel it.
    pub fn set_fetch(&mut self, fetch: FetchHandle) {
        self.fetch = Some(fetch);
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn has_producer(&self) -> bool {
        lock(&self.input).attached
    }

    pub fn sample_rate(&self) -> u32 {
        self.decoder.sample_rate()
    }

    pub fn buffered_frames(&self) -> usize {
        self.buffered.frames()
    }

    pub fn queued_bytes(&self) -> usize {
        lock(&self.input).queue.len()
    }

    /// Buffered audio in seconds of source time.
    pub fn buffered_seconds(&self) -> f32 {
        match self.sample_rate() {
            0 => 0.0,
            rate => self.buffered.frames() as f32 / rate as f32,
        }
    }

    pub fn peak_meter(&self) -> PeakMeter {
        self.peak.clone()
    }

    pub fn events(&self) -> &EventSender {
        &self.events
    }

    /// Resampling only applies while streaming; a stopped engine reports
    /// no resampling whatever the rates.
    pub fn needs_resampling(&self, target_sample_rate: u32) -> bool {
        self.streaming && target_sample_rate != self.sample_rate()
    }

    /// Buffered frames consumed to render `out_frames` at `target_sample_rate`.
    pub fn input_frames_needed(&mut self, target_sample_rate: u32, out_frames: usize) -> usize {
        if self.needs_resampling(target_sample_rate) && self.sample_rate() > 0 {
            let channels = self.buffered.channels();
            self.resampler
                .input_frames_next(self.sample_rate(), target_sample_rate, out_frames, channels)
        } else {
            out_frames
        }
    }

    /// Largest period, up to `out_frames`, whose resampled input is fully
    /// buffered. Returns `(input_frames, output_frames)`.
    fn fit_resampled_period(
        &mut self,
        target_sample_rate: u32,
        out_frames: usize,
    ) -> (usize, usize) {
        let source_rate = self.sample_rate();
        let buffered = self.buffered.frames();
        let mut out_len = out_frames;
        while out_len > 0 {
            let in_len = self.input_frames_needed(target_sample_rate, out_len);
            if in_len <= buffered {
                return (in_len, out_len);
            }
            // shrink by the output the missing input would have produced
            let missing = (in_len - buffered) as u64 * target_sample_rate as u64;
            out_len = out_len.saturating_sub((missing / source_rate as u64) as usize + 1);
        }
        (0, 0)
    }

    /// Decode up to `max_bytes` queued bytes in chunks of at most
    /// [`MAX_BYTES_PER_DECODING`]. Returns the number of chunks decoded.
    pub fn decode(&mut self, max_bytes: usize) -> usize {
        let bytes = {
            let mut input = lock(&self.input);
            if !input.attached {
                return 0;
            }
            input.queue.take_front(max_bytes)
        };

        let mut chunks = 0;
        for chunk in bytes.chunks(MAX_BYTES_PER_DECODING) {
            let decoded = self.decoder.decode(chunk);
            self.buffered.append(decoded);
            chunks += 1;
        }
        chunks
    }

    /// Render buffered audio into `out`, mixing rather than overwriting.
    ///
    /// Consumed frames are discarded from the buffer. A short render is an
    /// underrun: the missing tail of `out` is left untouched.
    pub fn render(&mut self, out: &mut SampleBuffer, target_sample_rate: u32) {
        if !self.streaming || self.buffered.is_empty() || out.is_empty() {
            return;
        }

        let source_rate = self.sample_rate();
        let resample = self.needs_resampling(target_sample_rate) && source_rate > 0;
        let (in_len, out_len) = if resample {
            // never ask for more input than is buffered
            self.fit_resampled_period(target_sample_rate, out.frames())
        } else {
            let len = out.frames().min(self.buffered.frames());
            (len, len)
        };
        if in_len == 0 || out_len == 0 {
            return;
        }

        self.input_scratch.copy_front_from(&self.buffered, in_len);
        let consumed = self.input_scratch.frames();
        if resample {
            let resampled = self.resampler.resample(
                &self.input_scratch,
                source_rate,
                target_sample_rate,
                out_len,
            );
            self.output_scratch.copy_front_from(resampled, resampled.frames());
        } else {
            self.output_scratch.copy_front_from(&self.input_scratch, consumed);
        }

        // keep non rendered samples for the next callback
        self.buffered.discard_front(consumed);

        self.fader.process(&mut self.output_scratch);

        if self.output_scratch.frames() < out.frames() {
            log::debug!(
                "{} samples missing",
                out.frames() - self.output_scratch.frames()
            );
        }

        self.peak.update(self.output_scratch.peak());
        out.add(&self.output_scratch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One stereo frame per byte, valued `byte / 256`.
    struct ByteFrames {
        rate: u32,
        out: SampleBuffer,
        calls: usize,
    }

    impl StreamDecoder for ByteFrames {
        fn decode(&mut self, data: &[u8]) -> &SampleBuffer {
            self.calls += 1;
            let samples: Vec<f32> = data.iter().map(|b| *b as f32 / 256.0).collect();
            self.out = SampleBuffer::from_planar(vec![samples.clone(), samples]);
            &self.out
        }

        fn reset(&mut self) {}

        fn sample_rate(&self) -> u32 {
            self.rate
        }
    }

    fn new_core(rate: u32) -> StreamCore {
        let decoder = ByteFrames {
            rate,
            out: SampleBuffer::new(2, 0),
            calls: 0,
        };
        StreamCore::new(Box::new(decoder), 2, 0, EventSender::disabled())
    }

    fn started(rate: u32, bytes: &[u8]) -> StreamCore {
        let mut core = new_core(rate);
        core.initialize("source");
        let sink = core.attach_producer();
        assert!(sink.on_data(bytes));
        core
    }

    #[test]
    fn test_decode_without_producer_is_noop() {
        let mut core = new_core(44100);
        assert_eq!(core.decode(4096), 0);
        assert_eq!(core.buffered_frames(), 0);
    }

    #[test]
    fn test_decode_splits_into_bounded_chunks() {
        let mut core = started(44100, &[7u8; 5000]);
        assert_eq!(core.decode(4096), 2);
        assert_eq!(core.buffered_frames(), 4096);
        assert_eq!(core.queued_bytes(), 904);
        assert_eq!(core.decode(4096), 1);
        assert_eq!(core.buffered_frames(), 5000);
        assert_eq!(core.decode(4096), 0);
    }

    #[test]
    fn test_render_mixes_and_discards_prefix() {
        let bytes: Vec<u8> = (0..=255u8).collect();
        let mut core = started(48000, &bytes);
        core.decode(1024);

        let mut out = SampleBuffer::from_planar(vec![vec![0.5; 100], vec![0.5; 100]]);
        core.render(&mut out, 48000);
        assert_eq!(out.channel(0)[0], 0.5);
        assert_eq!(out.channel(0)[10], 0.5 + 10.0 / 256.0);
        assert_eq!(core.buffered_frames(), 156);

        let mut next = SampleBuffer::new(2, 100);
        core.render(&mut next, 48000);
        assert_eq!(next.channel(1)[0], 100.0 / 256.0);
        assert_eq!(core.peak_meter().value(), 199.0 / 256.0);
    }

    #[test]
    fn test_underrun_leaves_tail_untouched() {
        let mut core = started(48000, &[128u8; 10]);
        core.decode(2048);
        let mut out = SampleBuffer::new(2, 32);
        core.render(&mut out, 48000);
        assert_eq!(out.channel(0)[9], 0.5);
        assert_eq!(out.channel(0)[10], 0.0);
        assert_eq!(core.buffered_frames(), 0);
    }

    #[test]
    fn test_resampling_only_while_streaming() {
        let mut core = new_core(44100);
        assert!(!core.needs_resampling(48000));
        core.initialize("source");
        assert!(core.needs_resampling(48000));
        assert!(!core.needs_resampling(44100));
        core.stop();
        assert!(!core.needs_resampling(48000));
    }

    #[test]
    fn test_resampled_render_consumes_source_frames() {
        let mut core = started(44100, &[64u8; 4096]);
        core.decode(4096);
        let mut out = SampleBuffer::new(2, 512);
        let needed = core.input_frames_needed(48000, 512);
        core.render(&mut out, 48000);
        assert_eq!(core.buffered_frames(), 4096 - needed);
        assert!(out.peak() > 0.0);
    }

    #[test]
    fn test_resampled_consumption_tracks_rate_ratio() {
        let mut core = started(44100, &[128u8; 40000]);
        core.decode(40000);
        let periods = 70;
        for _ in 0..periods {
            let mut out = SampleBuffer::new(2, 512);
            core.render(&mut out, 48000);
            assert!(out.channel(1)[511] > 0.0);
        }
        let consumed = 40000 - core.buffered_frames();
        let ideal = periods as f64 * 512.0 * 44100.0 / 48000.0;
        assert!((consumed as f64 - ideal).abs() < 16.0, "consumed {}", consumed);
    }

    #[test]
    fn test_resampled_underrun_uses_what_is_buffered() {
        let mut core = started(44100, &[128u8; 300]);
        core.decode(2048);
        let mut out = SampleBuffer::new(2, 512);
        core.render(&mut out, 48000);
        assert!(core.buffered_frames() < 300);
        assert!(out.channel(0)[100] > 0.0);
        assert_eq!(out.channel(0)[511], 0.0);
    }

    #[test]
    fn test_stale_sink_is_ignored() {
        let mut core = started(44100, &[1u8; 16]);
        let sink = core.attach_producer();
        core.stop();
        assert!(!sink.is_current());
        assert!(!sink.on_data(&[1u8; 16]));
        assert_eq!(core.queued_bytes(), 0);
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut core = started(44100, &[1u8; 3000]);
        core.decode(2048);
        core.stop();
        let snapshot = |core: &StreamCore| {
            (
                core.is_streaming(),
                core.buffered_frames(),
                core.queued_bytes(),
                core.has_producer(),
            )
        };
        let after_one = snapshot(&core);
        core.stop();
        let after_two = snapshot(&core);
        assert_eq!(after_one, (false, 0, 0, false));
        assert_eq!(after_one, after_two);
    }
}
