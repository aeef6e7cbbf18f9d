//! Render thread that stands in for an audio host.
//!
//! Uses std::thread (NOT tokio tasks) so the render cadence never competes
//! with async producers. Every period the node mixes into a zeroed output
//! block, exactly as a host render callback would drive it.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::audio::{PeakMeter, SampleBuffer};
use crate::config::Config;
use crate::streamer::{StreamNode, StreamState, Streamer};

/// Snapshot of the render thread, published once per period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RenderStatus {
    pub state: StreamState,
    /// Highest output sample since the previous status read.
    pub peak: f32,
    pub buffered_seconds: f32,
    pub periods: u64,
    pub sample_rate: u32,
}

struct Shared {
    running: AtomicBool,
    state: AtomicU8,
    /// f32 bits
    buffered_seconds: AtomicU32,
    periods: AtomicU64,
}

impl Shared {
    fn publish(&self, node: &StreamNode) {
        self.state.store(node.state().as_u8(), Ordering::Release);
        self.buffered_seconds
            .store(node.buffered_seconds().to_bits(), Ordering::Release);
    }
}

/// Drives a [`StreamNode`] at the configured period size and rate.
pub struct RenderLoop {
    shared: Arc<Shared>,
    node: Arc<Mutex<StreamNode>>,
    peak: PeakMeter,
    sample_rate: u32,
    reads_files: bool,
    handle: Option<JoinHandle<()>>,
}

impl RenderLoop {
    /// Start rendering `node`.
    pub fn start(node: StreamNode, config: &Config) -> Result<Self> {
        let sample_rate = config.render_sample_rate;
        let period_frames = config.period_frames.max(1);
        let channels = config.channels.max(1);

        log::info!(
            "RenderLoop starting: rate: {}Hz, period: {} frames, ch: {}",
            sample_rate,
            period_frames,
            channels,
        );

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            state: AtomicU8::new(node.state().as_u8()),
            buffered_seconds: AtomicU32::new(0),
            periods: AtomicU64::new(0),
        });
        let peak = node.peak_meter();
        let reads_files = node.reads_files();
        let node = Arc::new(Mutex::new(node));

        let handle = {
            let shared = shared.clone();
            let node = node.clone();
            thread::Builder::new()
                .name("audio-render".into())
                .spawn(move || {
                    render_thread(&node, &shared, sample_rate, period_frames, channels);
                })?
        };

        Ok(Self {
            shared,
            node,
            peak,
            sample_rate,
            reads_files,
            handle: Some(handle),
        })
    }

    /// Point the node at a new source. File contents are read before the
    /// node is locked, so the render thread waits at most one period.
    pub fn set_source(&self, source: &str) {
        if self.reads_files && !source.is_empty() {
            let loaded = std::fs::read(source);
            let mut node = self.node.lock().unwrap_or_else(PoisonError::into_inner);
            node.set_source_loaded(source, loaded);
            self.shared.publish(&node);
        } else {
            let mut node = self.node.lock().unwrap_or_else(PoisonError::into_inner);
            node.set_source(source);
            self.shared.publish(&node);
        }
    }

    /// Latest state and the peak accumulated since the last call.
    pub fn status(&self) -> RenderStatus {
        RenderStatus {
            state: StreamState::from_u8(self.shared.state.load(Ordering::Acquire)),
            peak: self.peak.take(),
            buffered_seconds: f32::from_bits(
                self.shared.buffered_seconds.load(Ordering::Acquire),
            ),
            periods: self.shared.periods.load(Ordering::Relaxed),
            sample_rate: self.sample_rate,
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Stop the thread and the node. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
            let mut node = self.node.lock().unwrap_or_else(PoisonError::into_inner);
            node.stop();
            self.shared.publish(&node);
        }
    }
}

impl Drop for RenderLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn render_thread(
    node: &Mutex<StreamNode>,
    shared: &Shared,
    sample_rate: u32,
    period_frames: usize,
    channels: usize,
) {
    let period = Duration::from_secs_f64(period_frames as f64 / sample_rate.max(1) as f64);
    let input = SampleBuffer::new(channels, 0);
    let mut output = SampleBuffer::new(channels, period_frames);
    let mut deadline = Instant::now();

    while shared.running.load(Ordering::SeqCst) {
        output.zero();
        {
            let mut node = node.lock().unwrap_or_else(PoisonError::into_inner);
            node.render(&input, &mut output, sample_rate);
            shared.publish(&node);
        }
        shared.periods.fetch_add(1, Ordering::Relaxed);

        deadline += period;
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        } else {
            // fell behind, don't try to catch up with a burst
            deadline = now;
        }
    }
    log::info!("RenderLoop stopped");
}
