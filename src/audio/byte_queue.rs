//! FIFO of undecoded bytes waiting for the decoder.

use bytes::{Bytes, BytesMut};

#[derive(Debug, Default)]
pub struct ByteQueue {
    buf: BytesMut,
}

impl ByteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes at the back of the queue.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Remove and return up to `max` bytes from the front.
    pub fn take_front(&mut self, max: usize) -> Bytes {
        let count = max.min(self.buf.len());
        self.buf.split_to(count).freeze()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}
