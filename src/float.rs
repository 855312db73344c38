use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FloatConst, FromPrimitive};

/// Marker trait for base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed throughout adtape, plus
/// the fixed-width little-endian encoding used by the tape codec.
/// Only primitive float types implement this; [`Ad`](crate::Ad) does not.
pub trait Float:
    NumFloat + FloatConst + FromPrimitive + Copy + Send + Sync + Default + Debug + Display + 'static
{
    /// Encoded width in bytes.
    const WIDTH: u8;

    /// Append the IEEE-754 bits, little-endian.
    fn write_le(self, out: &mut Vec<u8>);

    /// Read from exactly [`WIDTH`](Self::WIDTH) little-endian bytes.
    fn read_le(bytes: &[u8]) -> Self;
}

impl Float for f32 {
    const WIDTH: u8 = 4;

    #[inline]
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&bytes[..4]);
        f32::from_bits(u32::from_le_bytes(raw))
    }
}

impl Float for f64 {
    const WIDTH: u8 = 8;

    #[inline]
    fn write_le(self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_bits().to_le_bytes());
    }

    #[inline]
    fn read_le(bytes: &[u8]) -> Self {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes[..8]);
        f64::from_bits(u64::from_le_bytes(raw))
    }
}
