//! Byte-order codec for on-disk and on-bus fields.
//!
//! Every multi-byte field the loader reads from an image, and every sized
//! transfer a device helper marshals, goes through the single routine in this
//! module. It provides:
//! 1. **Decoding:** `decode` turns `N` raw bytes in a declared order into a host integer.
//! 2. **Encoding:** `encode` is the inverse, used by image builders and device helpers.
//! 3. **Header access:** `FieldReader` decodes fields at fixed offsets of a header buffer.
//! 4. **Device marshalling:** `read_max64` / `write_max64` for 1..=8 byte transfers.

use std::fmt;

/// Declared byte order of an image or an emulated CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Least-significant byte first.
    Little,
    /// Most-significant byte first.
    Big,
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => write!(f, "LSB (little-endian)"),
            Self::Big => write!(f, "MSB (big-endian)"),
        }
    }
}

/// Decodes `N` raw bytes stored in `order` into an unsigned integer.
///
/// Bytes are accumulated most-significant first; for little-endian input the
/// accumulation starts from the last byte. Widths other than 1, 2, 4 and 8
/// are rejected when the call is monomorphised.
///
/// # Examples
///
/// ```
/// use retrovm_core::common::endian::{decode, ByteOrder};
///
/// assert_eq!(decode([0x12, 0x34], ByteOrder::Big), 0x1234);
/// assert_eq!(decode([0x12, 0x34], ByteOrder::Little), 0x3412);
/// ```
#[inline]
pub fn decode<const N: usize>(raw: [u8; N], order: ByteOrder) -> u64 {
    const { assert!(matches!(N, 1 | 2 | 4 | 8), "field width must be 1, 2, 4 or 8 bytes") };
    let mut value = 0u64;
    for i in 0..N {
        let byte = match order {
            ByteOrder::Little => raw[N - 1 - i],
            ByteOrder::Big => raw[i],
        };
        value = (value << 8) | u64::from(byte);
    }
    value
}

/// Encodes the low `N` bytes of `value` in `order`.
///
/// Bits above `8 * N` are discarded.
#[inline]
pub fn encode<const N: usize>(value: u64, order: ByteOrder) -> [u8; N] {
    const { assert!(matches!(N, 1 | 2 | 4 | 8), "field width must be 1, 2, 4 or 8 bytes") };
    let mut raw = [0u8; N];
    for (i, slot) in raw.iter_mut().enumerate() {
        let shift = match order {
            ByteOrder::Little => 8 * i,
            ByteOrder::Big => 8 * (N - 1 - i),
        };
        *slot = (value >> shift) as u8;
    }
    raw
}

/// Reads a 1..=8 byte value from a device transfer buffer.
///
/// Longer buffers are truncated to their first eight bytes; an empty buffer
/// reads as zero.
pub fn read_max64(buf: &[u8], order: ByteOrder) -> u64 {
    let len = buf.len().min(8);
    let bytes = &buf[..len];
    let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
    match order {
        ByteOrder::Big => bytes.iter().fold(0, fold),
        ByteOrder::Little => bytes.iter().rev().fold(0, fold),
    }
}

/// Writes the low `buf.len()` bytes (at most eight) of `value` into a device
/// transfer buffer.
pub fn write_max64(buf: &mut [u8], order: ByteOrder, value: u64) {
    let len = buf.len().min(8);
    for (i, slot) in buf.iter_mut().take(len).enumerate() {
        let shift = match order {
            ByteOrder::Little => 8 * i,
            ByteOrder::Big => 8 * (len - 1 - i),
        };
        *slot = (value >> shift) as u8;
    }
}

/// Decodes fixed-offset fields from a header buffer in one byte order.
///
/// Callers pass buffers at least as long as the layout they decode; a field
/// that runs past the end of the buffer reads as zero.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    order: ByteOrder,
}

impl<'a> FieldReader<'a> {
    /// Wraps `buf`, decoding every field in `order`.
    pub const fn new(buf: &'a [u8], order: ByteOrder) -> Self {
        Self { buf, order }
    }

    /// Returns the byte order fields are decoded in.
    pub const fn order(&self) -> ByteOrder {
        self.order
    }

    /// Decodes an `N`-byte field at `offset`.
    #[inline]
    pub fn field<const N: usize>(&self, offset: usize) -> u64 {
        let mut raw = [0u8; N];
        if let Some(src) = offset
            .checked_add(N)
            .and_then(|end| self.buf.get(offset..end))
        {
            raw.copy_from_slice(src);
        }
        decode(raw, self.order)
    }

    /// Decodes a one-byte field.
    #[inline]
    pub fn u8(&self, offset: usize) -> u8 {
        self.field::<1>(offset) as u8
    }

    /// Decodes a two-byte field.
    #[inline]
    pub fn u16(&self, offset: usize) -> u16 {
        self.field::<2>(offset) as u16
    }

    /// Decodes a four-byte field.
    #[inline]
    pub fn u32(&self, offset: usize) -> u32 {
        self.field::<4>(offset) as u32
    }

    /// Decodes an eight-byte field.
    #[inline]
    pub fn u64(&self, offset: usize) -> u64 {
        self.field::<8>(offset)
    }
}
