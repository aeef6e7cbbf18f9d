//! Peak level meter shared between the render path and a monitor.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Rolling maximum absolute sample magnitude since the last reset.
///
/// Clones share the same value, so a UI or status task can hold a clone and
/// read it without touching the engine.
#[derive(Debug, Clone, Default)]
pub struct PeakMeter {
    bits: Arc<AtomicU32>,
}

impl PeakMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the meter to `peak` if it is louder than the current value.
    pub fn update(&self, peak: f32) {
        let peak = peak.abs();
        let _ = self
            .bits
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                (peak > f32::from_bits(current)).then_some(peak.to_bits())
            });
    }

    pub fn zero(&self) {
        self.bits.store(0.0f32.to_bits(), Ordering::Relaxed);
    }

    pub fn value(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Read the current value and reset the meter, for consumers polling per window.
    pub fn take(&self) -> f32 {
        f32::from_bits(self.bits.swap(0.0f32.to_bits(), Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_maximum() {
        let meter = PeakMeter::new();
        meter.update(0.25);
        meter.update(-0.75);
        meter.update(0.5);
        assert_eq!(meter.value(), 0.75);
    }

    #[test]
    fn test_clones_share_state() {
        let meter = PeakMeter::new();
        let monitor = meter.clone();
        meter.update(0.5);
        assert_eq!(monitor.value(), 0.5);
        assert_eq!(monitor.take(), 0.5);
        assert_eq!(meter.value(), 0.0);
        meter.update(0.125);
        meter.zero();
        assert_eq!(monitor.value(), 0.0);
    }
}
