//! Linear fade-in applied at the start of a stream to avoid clicks.

use super::sample_buffer::SampleBuffer;

#[derive(Debug, Clone)]
pub struct FadeIn {
    length: usize,
    position: usize,
}

impl FadeIn {
    /// `length` is the ramp duration in frames; 0 disables the fade.
    pub fn new(length: usize) -> Self {
        Self { length, position: 0 }
    }

    /// Restart the ramp so the next processed block starts from silence.
    pub fn reset(&mut self) {
        self.position = 0;
    }

    pub fn is_done(&self) -> bool {
        self.position >= self.length
    }

    pub fn process(&mut self, buf: &mut SampleBuffer) {
        if self.is_done() {
            return;
        }
        let length = self.length as f32;
        buf.apply_gain_ramp(self.position as f32 / length, 1.0 / length);
        self.position = (self.position + buf.frames()).min(self.length);
    }
}
