//! End-to-end behaviour of the stream nodes driven by a scripted decoder and
//! a transport the test pushes bytes through by hand.

use std::sync::{Arc, Mutex};

use room_stream::audio::{SampleBuffer, StreamDecoder};
use room_stream::config::Config;
use room_stream::streamer::{
    EventSender, NETWORK_DECODE_BYTES, NetworkStreamer, ProducerSink, StreamCore, StreamEvent,
    StreamState, Streamer, TestStreamer,
};
use room_stream::transport::{FetchHandle, Transport};
use tokio::sync::mpsc;
use url::Url;

/// Emits `frames_per_byte` stereo frames per input byte, valued `byte / 256`.
struct Scripted {
    rate: u32,
    frames_per_byte: usize,
    out: SampleBuffer,
    frames_decoded: Arc<Mutex<usize>>,
}

impl Scripted {
    fn new(rate: u32, frames_per_byte: usize) -> Self {
        Self {
            rate,
            frames_per_byte,
            out: SampleBuffer::new(2, 0),
            frames_decoded: Arc::new(Mutex::new(0)),
        }
    }
}

impl StreamDecoder for Scripted {
    fn decode(&mut self, data: &[u8]) -> &SampleBuffer {
        let samples: Vec<f32> = data
            .iter()
            .flat_map(|b| std::iter::repeat_n(*b as f32 / 256.0, self.frames_per_byte))
            .collect();
        *self.frames_decoded.lock().unwrap() += samples.len();
        self.out = SampleBuffer::from_planar(vec![samples.clone(), samples]);
        &self.out
    }

    fn reset(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.rate
    }
}

/// Hands every sink to the test instead of fetching anything.
#[derive(Default)]
struct ManualTransport {
    sinks: Mutex<Vec<ProducerSink>>,
}

impl ManualTransport {
    fn sink(&self) -> ProducerSink {
        self.sinks.lock().unwrap().last().cloned().expect("no fetch started")
    }
}

impl Transport for ManualTransport {
    fn fetch(&self, _url: &Url, sink: ProducerSink) -> FetchHandle {
        self.sinks.lock().unwrap().push(sink);
        FetchHandle::detached()
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.buffer_seconds = 3;
    config.max_buffered_seconds = 20;
    config.fade_in_seconds = 0.0;
    config.channels = 2;
    config
}

fn network(
    decoder: Scripted,
) -> (NetworkStreamer, Arc<ManualTransport>, mpsc::Receiver<StreamEvent>) {
    let transport = Arc::new(ManualTransport::default());
    let (tx, rx) = mpsc::channel(8);
    let node = NetworkStreamer::new(Box::new(decoder), transport.clone(), &config(), tx);
    (node, transport, rx)
}

fn scripted_core(rate: u32) -> StreamCore {
    StreamCore::new(Box::new(Scripted::new(rate, 1)), 2, 0, EventSender::disabled())
}

fn tick(node: &mut impl Streamer, frames: usize, rate: u32) -> SampleBuffer {
    let input = SampleBuffer::new(2, 0);
    let mut out = SampleBuffer::new(2, frames);
    node.render(&input, &mut out, rate);
    out
}

#[test]
fn two_pushes_drain_in_five_chunks() {
    let decoder = Scripted::new(44100, 1);
    let frames_decoded = decoder.frames_decoded.clone();
    let mut core = StreamCore::new(Box::new(decoder), 2, 0, EventSender::disabled());
    core.initialize("http://example.com/room.mp3");
    let sink = core.attach_producer();
    assert!(sink.on_data(&[1u8; 6000]));
    assert!(sink.on_data(&[2u8; 4000]));

    let mut calls = 0;
    while core.decode(2048) > 0 {
        calls += 1;
        if calls < 5 {
            assert_eq!(core.buffered_frames(), 2048 * calls);
        }
    }
    assert_eq!(calls, 5);
    assert_eq!(core.buffered_frames(), 10000);
    assert_eq!(*frames_decoded.lock().unwrap(), 10000);
    assert_eq!(core.queued_bytes(), 0);
}

#[test]
fn larger_decode_requests_still_split_into_bounded_chunks() {
    let mut core = scripted_core(44100);
    core.initialize("source");
    let sink = core.attach_producer();
    sink.on_data(&[1u8; 10000]);

    assert_eq!(core.decode(4096), 2);
    assert_eq!(core.decode(4096), 2);
    assert_eq!(core.decode(4096), 1);
    assert_eq!(core.decode(4096), 0);
    assert_eq!(core.buffered_frames(), 10000);
}

#[test]
fn prebuffering_switches_to_streaming_at_threshold() {
    let (mut node, transport, _rx) = network(Scripted::new(44100, 1));
    node.set_source("http://example.com/room.mp3");
    assert_eq!(node.threshold_frames(), 132300);

    let sink = transport.sink();
    sink.on_data(&vec![128u8; 132299]);

    while node.queued_bytes() > 0 {
        let out = tick(&mut node, 512, 44100);
        assert_eq!(node.state(), StreamState::Buffering);
        assert_eq!(out.peak(), 0.0);
        assert!(!node.needs_resampling(48000));
    }
    assert_eq!(node.buffered_frames(), 132299);

    sink.on_data(&[128u8]);
    let out = tick(&mut node, 512, 44100);
    assert_eq!(node.state(), StreamState::Streaming);
    assert_eq!(out.peak(), 0.5);
    assert_eq!(node.buffered_frames(), 132300 - 512);
    assert!(node.needs_resampling(48000));

    // draining below the threshold never returns to buffering
    while node.buffered_frames() > 0 {
        tick(&mut node, 4096, 44100);
        assert_eq!(node.state(), StreamState::Streaming);
    }
    let out = tick(&mut node, 512, 44100);
    assert_eq!(out.peak(), 0.0);
    assert_eq!(node.state(), StreamState::Streaming);
}

#[test]
fn buffered_audio_survives_transport_error() {
    let (mut node, transport, mut rx) = network(Scripted::new(44100, 50));
    node.set_source("http://example.com/room.mp3");
    let sink = transport.sink();
    sink.on_data(&[64u8; 4000]);

    let first = tick(&mut node, 512, 44100);
    assert_eq!(node.state(), StreamState::Streaming);
    assert_eq!(first.peak(), 0.25);
    assert_eq!(node.buffered_frames(), 200000 - 512);

    sink.on_error("connection reset");
    sink.on_error("connection reset");
    assert_eq!(rx.try_recv().unwrap(), StreamEvent::Error("connection reset".into()));
    assert!(rx.try_recv().is_err());

    let mut rendered = 512;
    loop {
        let out = tick(&mut node, 512, 44100);
        let audible = out.channel(0).iter().filter(|s| **s != 0.0).count();
        rendered += audible;
        if audible < 512 {
            break;
        }
    }
    assert_eq!(rendered, 200000);
    assert_eq!(node.buffered_frames(), 0);

    let out = tick(&mut node, 512, 44100);
    assert_eq!(out.peak(), 0.0);
    assert_eq!(node.state(), StreamState::Streaming);
}

#[test]
fn equal_rates_pass_samples_through_unchanged() {
    let bytes: Vec<u8> = (0..=255u8).cycle().take(3000).collect();
    let mut core = scripted_core(48000);
    core.initialize("source");
    core.attach_producer().on_data(&bytes);
    core.decode(4096);
    assert!(!core.needs_resampling(48000));

    let mut rendered = Vec::new();
    while core.buffered_frames() > 0 {
        let before = core.buffered_frames();
        let mut out = SampleBuffer::new(2, 700);
        core.render(&mut out, 48000);
        let consumed = before - core.buffered_frames();
        assert_eq!(consumed, 700.min(before));
        rendered.extend_from_slice(&out.channel(1)[..consumed]);
    }

    // every frame exactly once, in order, bit for bit
    let expected: Vec<f32> = bytes.iter().map(|b| *b as f32 / 256.0).collect();
    assert_eq!(rendered.len(), expected.len());
    assert!(rendered.iter().zip(&expected).all(|(a, b)| a.to_bits() == b.to_bits()));
}

#[test]
fn resampled_render_fills_the_period() {
    let mut core = scripted_core(44100);
    core.initialize("source");
    core.attach_producer().on_data(&[128u8; 8192]);
    core.decode(8192);
    assert!(core.needs_resampling(48000));

    let needed = core.input_frames_needed(48000, 512);
    let mut out = SampleBuffer::new(2, 512);
    core.render(&mut out, 48000);
    assert_eq!(core.buffered_frames(), 8192 - needed);
    assert!(out.channel(0)[256] > 0.4);
}

#[test]
fn stop_twice_matches_stop_once() {
    let (mut node, transport, _rx) = network(Scripted::new(44100, 1));
    node.set_source("http://example.com/room.mp3");
    let sink = transport.sink();
    sink.on_data(&[1u8; NETWORK_DECODE_BYTES * 2]);
    tick(&mut node, 512, 44100);

    node.stop();
    let snapshot = |node: &NetworkStreamer| {
        (
            node.state(),
            node.buffered_frames(),
            node.queued_bytes(),
            node.core().has_producer(),
        )
    };
    let once = snapshot(&node);
    node.stop();
    let twice = snapshot(&node);
    assert_eq!(once, (StreamState::Idle, 0, 0, false));
    assert_eq!(once, twice);

    // the old fetch is stale now
    assert!(!sink.on_data(&[1u8; 16]));
    assert_eq!(node.queued_bytes(), 0);
}

#[test]
fn new_source_ignores_previous_producer() {
    let (mut node, transport, mut rx) = network(Scripted::new(44100, 1));
    node.set_source("http://example.com/a.mp3");
    let old = transport.sink();
    node.set_source("http://example.com/b.mp3");
    let new = transport.sink();

    assert!(!old.on_data(&[1u8; 64]));
    old.on_error("late failure");
    assert!(rx.try_recv().is_err());

    assert!(new.on_data(&[1u8; 64]));
    assert_eq!(node.queued_bytes(), 64);
    assert_eq!(node.state(), StreamState::Buffering);
}

#[test]
fn test_tone_renders_full_period_then_stops() {
    let mut node = TestStreamer::new(440.0, 0.5);
    let out = tick(&mut node, 512, 48000);
    assert_eq!(out.frames(), 512);
    let silent = out.channel(0).iter().filter(|s| **s == 0.0).count();
    // only the zero crossing at phase 0
    assert_eq!(silent, 1);
    assert!(node.peak_meter().value() > 0.0);

    node.stop();
    for _ in 0..3 {
        let out = tick(&mut node, 512, 48000);
        assert_eq!(out.peak(), 0.0);
    }
}
