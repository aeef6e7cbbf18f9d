//! Planar multichannel f32 sample container used for every PCM hop in the
//! pipeline: decoded audio waiting to be rendered, resampler scratch blocks
//! and the host's output mix.

/// Growable planar PCM buffer.
///
/// A frame is one sample per channel. Discarding from the front only moves a
/// read offset; the consumed prefix is compacted away lazily on the next
/// append, so the render path never shifts samples on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    data: Vec<Vec<f32>>,
    offset: usize,
    frames: usize,
}

impl SampleBuffer {
    /// Create a zeroed buffer. A channel count of 0 is promoted to mono.
    pub fn new(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            data: (0..channels).map(|_| vec![0.0; frames]).collect(),
            offset: 0,
            frames,
        }
    }

    /// Build a buffer from per-channel sample vectors of equal length.
    pub fn from_planar(planar: Vec<Vec<f32>>) -> Self {
        if planar.is_empty() {
            return Self::new(1, 0);
        }
        let frames = planar.iter().map(Vec::len).min().unwrap_or(0);
        let data = planar
            .into_iter()
            .map(|mut ch| {
                ch.truncate(frames);
                ch
            })
            .collect();
        Self { data, offset: 0, frames }
    }

    /// Build a buffer from interleaved samples (`[L, R, L, R, ...]`).
    pub fn from_interleaved(samples: &[f32], channels: usize) -> Self {
        let channels = channels.max(1);
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];
        for frame in samples.chunks_exact(channels) {
            for (ch, sample) in frame.iter().enumerate() {
                planar[ch].push(*sample);
            }
        }
        Self::from_planar(planar)
    }

    pub fn channels(&self) -> usize {
        self.data.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn is_empty(&self) -> bool {
        self.frames == 0
    }

    pub fn channel(&self, ch: usize) -> &[f32] {
        &self.data[ch][self.offset..self.offset + self.frames]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let (start, end) = (self.offset, self.offset + self.frames);
        &mut self.data[ch][start..end]
    }

    /// Resize the visible frame count. Growing pads with silence.
    pub fn set_frames(&mut self, frames: usize) {
        let len = self.offset + frames;
        for ch in &mut self.data {
            ch.resize(len, 0.0);
        }
        self.frames = frames;
    }

    /// Append all frames of `other`. Channels are mapped `c % other.channels()`,
    /// so a mono block fills every channel of a stereo buffer.
    pub fn append(&mut self, other: &SampleBuffer) {
        if other.is_empty() {
            return;
        }
        self.compact();
        let src_channels = other.channels();
        for (ch, dst) in self.data.iter_mut().enumerate() {
            dst.truncate(self.offset + self.frames);
            dst.extend_from_slice(other.channel(ch % src_channels));
        }
        self.frames += other.frames();
    }

    /// Drop the first `count` frames. Remaining frames keep their order.
    pub fn discard_front(&mut self, count: usize) {
        let count = count.min(self.frames);
        self.offset += count;
        self.frames -= count;
        if self.frames == 0 {
            self.clear();
        }
    }

    /// Replace the contents with the first `count` frames of `src`.
    pub fn copy_front_from(&mut self, src: &SampleBuffer, count: usize) {
        let count = count.min(src.frames());
        self.set_frames(count);
        let src_channels = src.channels();
        for ch in 0..self.channels() {
            let from = &src.channel(ch % src_channels)[..count];
            self.channel_mut(ch).copy_from_slice(from);
        }
    }

    /// Mix `other` into this buffer, summing the overlapping frames.
    pub fn add(&mut self, other: &SampleBuffer) {
        let count = self.frames.min(other.frames());
        let src_channels = other.channels();
        for ch in 0..self.channels() {
            let src = &other.channel(ch % src_channels)[..count];
            for (dst, s) in self.channel_mut(ch)[..count].iter_mut().zip(src) {
                *dst += *s;
            }
        }
    }

    /// Silence every visible sample, keeping the frame count.
    pub fn zero(&mut self) {
        for ch in 0..self.channels() {
            self.channel_mut(ch).fill(0.0);
        }
    }

    /// Drop all frames. Allocated capacity is kept for reuse.
    pub fn clear(&mut self) {
        for ch in &mut self.data {
            ch.clear();
        }
        self.offset = 0;
        self.frames = 0;
    }

    /// Scale frame `i` by `start + i * step`, clamped to `[0, 1]`.
    pub fn apply_gain_ramp(&mut self, start: f32, step: f32) {
        for ch in 0..self.channels() {
            for (i, sample) in self.channel_mut(ch).iter_mut().enumerate() {
                *sample *= (start + step * i as f32).clamp(0.0, 1.0);
            }
        }
    }

    /// Maximum absolute sample value across all channels.
    pub fn peak(&self) -> f32 {
        (0..self.channels())
            .flat_map(|ch| self.channel(ch).iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    fn compact(&mut self) {
        // only pay for the shift once the dead prefix outweighs the live data
        if self.offset > 0 && self.offset >= self.frames {
            for ch in &mut self.data {
                ch.drain(..self.offset);
            }
            self.offset = 0;
        }
    }
}
