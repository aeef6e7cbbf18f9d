//! Generic stream decoder trait for the buffered streamers.

use super::sample_buffer::SampleBuffer;

/// A stateful decoder turning spans of compressed bytes into PCM.
///
/// Implementations keep partial frames between calls, so a byte stream may be
/// split at arbitrary offsets. Malformed input never fails the call: it yields
/// an empty or short block and the caller sees a buffer underrun instead.
pub trait StreamDecoder: Send {
    /// Decode `data`, returning the PCM produced by this call only.
    fn decode(&mut self, data: &[u8]) -> &SampleBuffer;

    /// Discard partially decoded bytes and codec state.
    fn reset(&mut self);

    /// Sample rate of the decoded stream.
    fn sample_rate(&self) -> u32;

    /// Channel count of the decoded stream.
    fn channels(&self) -> usize {
        2
    }
}
