//! # Stream Framing
//!
//! `[len:u16 BE][payload:len]`, back to back on a byte stream.
//!
//! The transport hands over arbitrary slices: half a length prefix, three
//! frames at once, a frame split across five deliveries. [`FrameDecoder`]
//! buffers whatever arrived and hands out complete payloads one at a time.

use crate::error::FrameError;

/// Size of the length prefix.
pub const LENGTH_PREFIX: usize = 2;

/// Largest payload a frame can carry.
pub const MAX_PAYLOAD: usize = u16::MAX as usize;

/// Prepends the length prefix to `payload`.
///
/// # Errors
///
/// Returns [`FrameError::TooLarge`] if the payload exceeds [`MAX_PAYLOAD`].
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u16::try_from(payload.len()).map_err(|_| FrameError::TooLarge(payload.len()))?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame decoder for one byte stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a delivery from the transport.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Pops the next complete payload, if one is buffered.
    ///
    /// A zero-length frame yields an empty payload.
    pub fn next_frame(&mut self) -> Option<Vec<u8>> {
        let header: [u8; LENGTH_PREFIX] = self.buffer.get(..LENGTH_PREFIX)?.try_into().ok()?;
        let len = usize::from(u16::from_be_bytes(header));
        let end = LENGTH_PREFIX + len;
        if self.buffer.len() < end {
            return None;
        }
        let payload = self.buffer[LENGTH_PREFIX..end].to_vec();
        self.buffer.drain(..end);
        Some(payload)
    }

    /// Iterates complete payloads currently buffered.
    pub fn frames(&mut self) -> Frames<'_> {
        Frames { decoder: self }
    }

    /// Bytes held waiting for the rest of a frame.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

/// Draining iterator returned by [`FrameDecoder::frames`].
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.decoder.next_frame()
    }
}
