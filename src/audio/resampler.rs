//! Sample rate conversion between the decoded stream and the render rate.
//!
//! The render path asks for an exact number of output frames per period, so
//! the converter runs with a fixed output size and reports how many input
//! frames the next period consumes. The rubato instance is cached per
//! (rates, period size, channels) so consecutive periods share filter state
//! and no source frame is dropped or repeated between them.

use rubato::{FastFixedOut, PolynomialDegree, Resampler as RubatoResampler};

use super::sample_buffer::SampleBuffer;
use crate::error::{Result, StreamError};

/// Average number of input frames needed to produce `out_frames` at
/// `target_rate` from a stream running at `source_rate`.
pub fn input_frames_for(source_rate: u32, target_rate: u32, out_frames: usize) -> usize {
    if source_rate == 0 || target_rate == 0 {
        return 0;
    }
    let num = out_frames as u64 * source_rate as u64;
    num.div_ceil(target_rate as u64) as usize
}

struct Cached {
    source_rate: u32,
    target_rate: u32,
    chunk: usize,
    channels: usize,
    inner: FastFixedOut<f32>,
}

pub struct Resampler {
    cached: Option<Cached>,
    output: SampleBuffer,
}

impl Default for Resampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Resampler {
    pub fn new() -> Self {
        Self {
            cached: None,
            output: SampleBuffer::new(2, 0),
        }
    }

    /// Input frames the next call to [`resample`](Self::resample) with the
    /// same arguments consumes to produce `out_frames`.
    pub fn input_frames_next(
        &mut self,
        source_rate: u32,
        target_rate: u32,
        out_frames: usize,
        channels: usize,
    ) -> usize {
        if out_frames == 0 {
            return 0;
        }
        match self.prepare(source_rate, target_rate, out_frames, channels) {
            Ok(inner) => inner.input_frames_next(),
            Err(e) => {
                log::warn!("Resampler {}Hz -> {}Hz unavailable: {}", source_rate, target_rate, e);
                input_frames_for(source_rate, target_rate, out_frames)
            }
        }
    }

    /// Convert the first [`input_frames_next`](Self::input_frames_next)
    /// frames of `input` from `source_rate` to `target_rate`, producing
    /// exactly `desired_frames` frames.
    ///
    /// A failing conversion is logged and yields silence of the requested
    /// length; the render path never sees an error.
    pub fn resample(
        &mut self,
        input: &SampleBuffer,
        source_rate: u32,
        target_rate: u32,
        desired_frames: usize,
    ) -> &SampleBuffer {
        if self.output.channels() != input.channels() {
            self.output = SampleBuffer::new(input.channels(), 0);
        }
        self.output.set_frames(desired_frames);
        self.output.zero();
        if desired_frames == 0 || input.is_empty() {
            return &self.output;
        }

        match self.process(input, source_rate, target_rate, desired_frames) {
            Ok(planar) => {
                for (ch, samples) in planar.iter().enumerate() {
                    let dst = self.output.channel_mut(ch);
                    let produced = samples.len().min(desired_frames);
                    dst[..produced].copy_from_slice(&samples[..produced]);
                    if let Some(last) = samples.last() {
                        dst[produced..].fill(*last);
                    }
                }
            }
            Err(e) => {
                log::warn!("Resampling {}Hz -> {}Hz failed: {}", source_rate, target_rate, e);
                self.cached = None;
            }
        }
        &self.output
    }

    fn prepare(
        &mut self,
        source_rate: u32,
        target_rate: u32,
        chunk: usize,
        channels: usize,
    ) -> Result<&mut FastFixedOut<f32>> {
        if source_rate == 0 || target_rate == 0 {
            return Err(StreamError::Resampler(format!(
                "invalid rates {}Hz -> {}Hz",
                source_rate, target_rate
            )));
        }
        let reusable = self.cached.as_ref().is_some_and(|c| {
            c.source_rate == source_rate
                && c.target_rate == target_rate
                && c.chunk == chunk
                && c.channels == channels
        });
        if !reusable {
            log::debug!(
                "Creating resampler {}Hz -> {}Hz, chunk={} frames, ch={}",
                source_rate,
                target_rate,
                chunk,
                channels
            );
            let inner = FastFixedOut::<f32>::new(
                target_rate as f64 / source_rate as f64,
                1.0,
                PolynomialDegree::Cubic,
                chunk,
                channels,
            )
            .map_err(|e| StreamError::Resampler(e.to_string()))?;
            self.cached = Some(Cached {
                source_rate,
                target_rate,
                chunk,
                channels,
                inner,
            });
        }
        self.cached
            .as_mut()
            .map(|c| &mut c.inner)
            .ok_or_else(|| StreamError::Resampler("resampler not initialised".into()))
    }

    fn process(
        &mut self,
        input: &SampleBuffer,
        source_rate: u32,
        target_rate: u32,
        desired_frames: usize,
    ) -> Result<Vec<Vec<f32>>> {
        let channels = input.channels();
        let inner = self.prepare(source_rate, target_rate, desired_frames, channels)?;
        let needed = inner.input_frames_next();
        if input.frames() < needed {
            return Err(StreamError::Resampler(format!(
                "need {} input frames, got {}",
                needed,
                input.frames()
            )));
        }
        let wave_in: Vec<&[f32]> = (0..channels).map(|ch| &input.channel(ch)[..needed]).collect();
        inner
            .process(&wave_in, None)
            .map_err(|e| StreamError::Resampler(e.to_string()))
    }
}
