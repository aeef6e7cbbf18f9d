//! MP3 decoder adapter for byte streams arriving in arbitrary slices.
//!
//! Incoming bytes are synchronised on MPEG audio frame headers; each complete
//! Layer III frame is handed to symphonia as one packet. Incomplete frames
//! stay in `pending` until the next call.

use symphonia::core::audio::{Channels, SampleBuffer as InterleavedBuffer};
use symphonia::core::codecs::{CODEC_TYPE_MP3, CodecParameters, Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::Packet;

use super::sample_buffer::SampleBuffer;
use super::stream_decoder::StreamDecoder;
use crate::error::{Result, StreamError};

/// Sample rate reported before the first frame has been seen.
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

const HEADER_LEN: usize = 4;
const ID3V2_HEADER_LEN: usize = 10;

const BITRATES_V1: [[u32; 15]; 3] = [
    [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448],
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384],
    [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320],
];
const BITRATES_V2: [[u32; 15]; 3] = [
    [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
    [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160],
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MpegVersion {
    V1,
    V2,
    V2_5,
}

/// Parsed 4-byte MPEG audio frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    version: MpegVersion,
    /// 1, 2 or 3
    pub layer: u8,
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
    pub channels: usize,
    /// Whole frame length in bytes, header included.
    pub frame_len: usize,
}

impl FrameHeader {
    /// Parse a header at the start of `bytes`. Free-format and reserved values
    /// are rejected so the caller keeps scanning for the next sync word.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < HEADER_LEN || bytes[0] != 0xFF || bytes[1] & 0xE0 != 0xE0 {
            return None;
        }
        let version = match (bytes[1] >> 3) & 0x03 {
            0 => MpegVersion::V2_5,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return None,
        };
        let layer = match (bytes[1] >> 1) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return None,
        };
        let bitrate_index = (bytes[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return None;
        }
        let rate_index = ((bytes[2] >> 2) & 0x03) as usize;
        if rate_index == 3 {
            return None;
        }
        let padding = ((bytes[2] >> 1) & 0x01) as usize;
        let channels = if (bytes[3] >> 6) == 3 { 1 } else { 2 };

        let table = match version {
            MpegVersion::V1 => &BITRATES_V1,
            _ => &BITRATES_V2,
        };
        let bitrate_kbps = table[layer as usize - 1][bitrate_index];
        let sample_rate = match version {
            MpegVersion::V1 => [44100, 48000, 32000][rate_index],
            MpegVersion::V2 => [22050, 24000, 16000][rate_index],
            MpegVersion::V2_5 => [11025, 12000, 8000][rate_index],
        };

        let bitrate = bitrate_kbps as usize * 1000;
        let rate = sample_rate as usize;
        let frame_len = match (layer, version) {
            (1, _) => (12 * bitrate / rate + padding) * 4,
            (3, MpegVersion::V2 | MpegVersion::V2_5) => 72 * bitrate / rate + padding,
            _ => 144 * bitrate / rate + padding,
        };

        Some(Self {
            version,
            layer,
            bitrate_kbps,
            sample_rate,
            channels,
            frame_len,
        })
    }

    /// PCM frames carried by one compressed frame.
    pub fn samples_per_frame(&self) -> u64 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (3, MpegVersion::V2 | MpegVersion::V2_5) => 576,
            _ => 1152,
        }
    }
}

/// Length of an ID3v2 tag starting at `bytes`, if one does.
fn id3v2_len(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < ID3V2_HEADER_LEN || &bytes[..3] != b"ID3" {
        return None;
    }
    // version bytes are never 0xFF and the size is four 7-bit bytes
    if bytes[3] == 0xFF || bytes[4] == 0xFF || bytes[6..10].iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b & 0x7F) as usize);
    Some(ID3V2_HEADER_LEN + size)
}

fn make_decoder(header: &FrameHeader) -> Result<Box<dyn Decoder>> {
    let layout = if header.channels == 1 {
        Channels::FRONT_LEFT
    } else {
        Channels::FRONT_LEFT | Channels::FRONT_RIGHT
    };
    let mut params = CodecParameters::new();
    params
        .for_codec(CODEC_TYPE_MP3)
        .with_sample_rate(header.sample_rate)
        .with_channels(layout);
    symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| StreamError::Decoder(e.to_string()))
}

/// [`StreamDecoder`] for MPEG-1/2 Layer III streams.
pub struct Mp3Decoder {
    decoder: Option<Box<dyn Decoder>>,
    pending: Vec<u8>,
    output: SampleBuffer,
    interleaved: Option<((u64, usize), InterleavedBuffer<f32>)>,
    sample_rate: u32,
    channels: usize,
    timestamp: u64,
    /// Set once the first frame header is found; ID3v2 tags are only
    /// honoured before that.
    synced: bool,
}

impl Default for Mp3Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Mp3Decoder {
    pub fn new() -> Self {
        Self {
            decoder: None,
            pending: Vec::with_capacity(4096),
            output: SampleBuffer::new(2, 0),
            interleaved: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 2,
            timestamp: 0,
            synced: false,
        }
    }

    /// Bytes held back waiting for the rest of a frame.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn decode_frame(&mut self, header: &FrameHeader, frame: &[u8]) {
        if header.layer != 3 {
            log::debug!("Skipping MPEG layer {} frame", header.layer);
            return;
        }
        if self.decoder.is_none()
            || header.sample_rate != self.sample_rate
            || header.channels != self.channels
        {
            match make_decoder(header) {
                Ok(decoder) => self.decoder = Some(decoder),
                Err(e) => {
                    log::error!("{}", e);
                    return;
                }
            }
            log::debug!(
                "MP3 stream format: {}Hz, {} ch, {} kbps",
                header.sample_rate,
                header.channels,
                header.bitrate_kbps
            );
            self.sample_rate = header.sample_rate;
            self.channels = header.channels;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        let duration = header.samples_per_frame();
        let packet = Packet::new_from_slice(0, self.timestamp, duration, frame);
        self.timestamp += duration;

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let capacity = decoded.capacity() as u64;
                let shape = (capacity, spec.channels.count());
                if self.interleaved.as_ref().is_none_or(|(s, _)| *s != shape) {
                    self.interleaved = Some((shape, InterleavedBuffer::<f32>::new(capacity, spec)));
                }
                if let Some((_, buf)) = self.interleaved.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    let channels = spec.channels.count();
                    let block = SampleBuffer::from_interleaved(buf.samples(), channels);
                    if self.output.channels() != block.channels() && self.output.is_empty() {
                        self.output = SampleBuffer::new(block.channels(), 0);
                    }
                    self.output.append(&block);
                }
            }
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Dropping undecodable MP3 frame: {}", e);
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
            }
            Err(e) => {
                log::warn!("MP3 decode error: {}", e);
            }
        }
    }
}

impl StreamDecoder for Mp3Decoder {
    fn decode(&mut self, data: &[u8]) -> &SampleBuffer {
        self.output.clear();
        let mut pending = std::mem::take(&mut self.pending);
        pending.extend_from_slice(data);

        let mut pos = 0;
        while pending.len() - pos >= HEADER_LEN {
            let rest = &pending[pos..];
            if let Some(tag_len) = id3v2_len(rest).filter(|_| !self.synced) {
                if rest.len() < tag_len {
                    break;
                }
                pos += tag_len;
                continue;
            }
            match FrameHeader::parse(rest) {
                Some(header) if header.frame_len > HEADER_LEN => {
                    if rest.len() < header.frame_len {
                        break;
                    }
                    self.synced = true;
                    let frame = &rest[..header.frame_len];
                    self.decode_frame(&header, frame);
                    pos += header.frame_len;
                }
                // lost sync, slide one byte
                _ => pos += 1,
            }
        }

        pending.drain(..pos);
        self.pending = pending;
        &self.output
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.output.clear();
        self.timestamp = 0;
        self.synced = false;
        if let Some(decoder) = self.decoder.as_mut() {
            decoder.reset();
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> usize {
        self.channels
    }
}
