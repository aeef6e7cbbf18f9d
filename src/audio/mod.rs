//! audio - PCM containers and processing stages of the streaming pipeline
//!
//! Decoded audio moves through planar f32 [`SampleBuffer`]s. Compressed
//! bytes wait in a [`ByteQueue`] until a [`StreamDecoder`] turns them into
//! samples; the [`Resampler`] adapts them to the host rate.

mod byte_queue;
mod fader;
mod mp3;
mod peak;
pub mod resampler;
mod sample_buffer;
pub mod stream_decoder;

pub use byte_queue::ByteQueue;
pub use fader::FadeIn;
pub use mp3::Mp3Decoder;
pub use peak::PeakMeter;
pub use resampler::Resampler;
pub use sample_buffer::SampleBuffer;
pub use stream_decoder::StreamDecoder;
