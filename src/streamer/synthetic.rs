//! Synthetic sine source, used to exercise the render path without a
//! producer or decoder.

use std::f64::consts::TAU;

use crate::audio::{ByteQueue, FadeIn, PeakMeter, SampleBuffer};
use crate::config::Config;

use super::{StreamState, Streamer};

/// Phase-continuous sine generator.
#[derive(Debug, Clone)]
pub struct Oscillator {
    frequency: f32,
    amplitude: f32,
    phase: f64,
}

impl Oscillator {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
            phase: 0.0,
        }
    }

    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Overwrite every channel of `buf` with the next `buf.frames()` samples.
    pub fn fill(&mut self, buf: &mut SampleBuffer, sample_rate: u32) {
        if sample_rate == 0 {
            buf.zero();
            return;
        }
        let step = TAU * self.frequency as f64 / sample_rate as f64;
        let start = self.phase;
        for ch in 0..buf.channels() {
            let mut phase = start;
            for sample in buf.channel_mut(ch) {
                *sample = (phase.sin() * self.amplitude as f64) as f32;
                phase += step;
            }
        }
        self.phase = (start + step * buf.frames() as f64) % TAU;
    }
}

/// Test node that plays a sine tone while started.
///
/// It owns its peak meter, fade and byte queue but never decodes, and it
/// always renders at the requested rate.
pub struct TestStreamer {
    oscillator: Oscillator,
    playing: bool,
    peak: PeakMeter,
    fader: FadeIn,
    queue: ByteQueue,
    scratch: SampleBuffer,
}

impl TestStreamer {
    pub fn new(frequency: f32, amplitude: f32) -> Self {
        Self {
            oscillator: Oscillator::new(frequency, amplitude),
            playing: true,
            peak: PeakMeter::new(),
            fader: FadeIn::new(0),
            queue: ByteQueue::new(),
            scratch: SampleBuffer::new(2, 0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let mut node = Self::new(config.test_tone_frequency, config.test_tone_amplitude);
        node.fader = FadeIn::new(config.fade_in_frames(config.render_sample_rate));
        node.scratch = SampleBuffer::new(config.channels, 0);
        node
    }
}

impl Streamer for TestStreamer {
    fn set_source(&mut self, _source: &str) {
        self.fader.reset();
        self.queue.clear();
        self.oscillator.reset();
        self.playing = true;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.peak.zero();
    }

    fn render(&mut self, _input: &SampleBuffer, out: &mut SampleBuffer, sample_rate: u32) {
        if !self.playing || out.is_empty() {
            return;
        }
        if self.scratch.channels() != out.channels() {
            self.scratch = SampleBuffer::new(out.channels(), 0);
        }
        self.scratch.set_frames(out.frames());
        self.oscillator.fill(&mut self.scratch, sample_rate);
        self.fader.process(&mut self.scratch);
        self.peak.update(self.scratch.peak());
        out.add(&self.scratch);
    }

    fn needs_resampling(&self, _target_sample_rate: u32) -> bool {
        false
    }

    fn peak_meter(&self) -> PeakMeter {
        self.peak.clone()
    }

    fn state(&self) -> StreamState {
        if self.playing {
            StreamState::Streaming
        } else {
            StreamState::Idle
        }
    }
}
