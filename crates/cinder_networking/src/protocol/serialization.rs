//! # Field Serialization
//!
//! Big-endian primitive writers and readers for message payloads.
//!
//! ## Design
//!
//! - Writers append to a caller-owned `Vec<u8>` sized for the message
//! - Readers never panic on short input, every read returns `Option`
//! - Floats travel as their IEEE-754 bit pattern

use cinder_core::EntityId;

/// Payload writer.
///
/// Reuse one writer across messages with [`WireWriter::reset`] to keep the
/// allocation.
#[derive(Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Clears written bytes, keeping capacity.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the payload.
    #[inline]
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.push(value);
        self
    }

    /// Writes a u16 in big-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Writes a f32 in big-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) -> &mut Self {
        self.buffer.extend_from_slice(&value.to_bits().to_be_bytes());
        self
    }

    /// Writes a 128-bit entity id in big-endian format.
    #[inline]
    pub fn write_id(&mut self, id: EntityId) -> &mut Self {
        self.buffer.extend_from_slice(&id.to_be_bytes());
        self
    }
}

/// Payload reader over a borrowed buffer.
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a new reader from a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let end = self.position.checked_add(N)?;
        let bytes: [u8; N] = self.buffer.get(self.position..end)?.try_into().ok()?;
        self.position = end;
        Some(bytes)
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    /// Reads a u16 in big-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_be_bytes)
    }

    /// Reads a f32 in big-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.take::<4>().map(|b| f32::from_bits(u32::from_be_bytes(b)))
    }

    /// Reads a 128-bit entity id in big-endian format.
    #[inline]
    pub fn read_id(&mut self) -> Option<EntityId> {
        self.take::<16>().map(EntityId::from_be_bytes)
    }
}
