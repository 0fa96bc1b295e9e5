//! # Sequence Numbers
//!
//! 16-bit counters that wrap at 65536. Input sequences and damage sequences
//! both use these, and both are compared with [`seq_newer`] so ordering
//! survives the wrap.
//!
//! ```text
//! 65534  65535  0  1  2
//!   ─────────────────────▶   each value is newer than the ones to its left,
//!                            as long as the gap stays under half the ring
//! ```

/// Sequence number type alias.
pub type SequenceNumber = u16;

/// Half of the sequence space. Gaps at or beyond this read as "older".
pub const HALF_RANGE: u16 = 32_768;

/// Returns true if `a` is strictly newer than `b` under wraparound.
///
/// `newer(a, b) := ((a - b) mod 65536) < 32768`, with `a != b`.
#[inline]
#[must_use]
pub const fn seq_newer(a: SequenceNumber, b: SequenceNumber) -> bool {
    let diff = a.wrapping_sub(b);
    diff != 0 && diff < HALF_RANGE
}

/// Returns the successor of `seq`, wrapping at 65536.
#[inline]
#[must_use]
pub const fn seq_next(seq: SequenceNumber) -> SequenceNumber {
    seq.wrapping_add(1)
}
