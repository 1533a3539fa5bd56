//! Complex sample packing. Each sample is an in-phase lane followed by a
//! quadrature lane, each a big-endian two's-complement integer of the
//! stream's bit depth.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use num_complex::Complex;

use crate::error::FrameError;

/// Payload format word for 8-bit complex signed samples.
pub const PAYLOAD_FORMAT_8_BIT: u64 = 0xA000_01C7_0000_0000;

/// Payload format word for 16-bit complex signed samples.
pub const PAYLOAD_FORMAT_16_BIT: u64 = 0xA000_01CF_0000_0000;

/// Supported sample lane widths.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BitDepth {
    Eight,
    #[default]
    Sixteen,
}

impl BitDepth {
    /// Lane width in bits.
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::Eight => 8,
            BitDepth::Sixteen => 16,
        }
    }

    pub fn bytes_per_lane(self) -> usize {
        usize::from(self.bits()) / 8
    }

    /// Bytes per complex sample (two lanes).
    pub fn bytes_per_sample(self) -> usize {
        self.bytes_per_lane() * 2
    }

    /// Payload format word advertised in context packets.
    pub fn payload_format(self) -> u64 {
        match self {
            BitDepth::Eight => PAYLOAD_FORMAT_8_BIT,
            BitDepth::Sixteen => PAYLOAD_FORMAT_16_BIT,
        }
    }

    /// Depth advertised by a payload format word.
    pub fn from_payload_format(payload_format: u64) -> Result<Self, FrameError> {
        Self::try_from(payload_format_bit_depth(payload_format))
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = FrameError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(BitDepth::Eight),
            16 => Ok(BitDepth::Sixteen),
            other => Err(FrameError::UnsupportedBitDepth(other)),
        }
    }
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-bit", self.bits())
    }
}

/// Bit depth encoded in bits 32..37 of a payload format word, plus one.
pub fn payload_format_bit_depth(payload_format: u64) -> u8 {
    ((payload_format >> 32) & 0x1F) as u8 + 1
}

/// Append one sample. At 8 bits each lane keeps only its low byte.
pub fn pack_sample(dst: &mut BytesMut, sample: Complex<i16>, depth: BitDepth) {
    match depth {
        BitDepth::Eight => {
            dst.put_i8(sample.re as i8);
            dst.put_i8(sample.im as i8);
        }
        BitDepth::Sixteen => {
            dst.put_i16(sample.re);
            dst.put_i16(sample.im);
        }
    }
}

/// Append a run of samples.
pub fn pack_samples(dst: &mut BytesMut, samples: &[Complex<i16>], depth: BitDepth) {
    dst.reserve(samples.len() * depth.bytes_per_sample());
    for &sample in samples {
        pack_sample(dst, sample, depth);
    }
}

/// Decode up to `max` whole samples from `payload` into `out`.
///
/// Trailing bytes that do not form a whole sample are ignored. Returns the
/// number of samples appended.
pub fn unpack_samples(
    mut payload: &[u8],
    depth: BitDepth,
    max: usize,
    out: &mut Vec<Complex<i16>>,
) -> usize {
    let count = (payload.len() / depth.bytes_per_sample()).min(max);
    out.reserve(count);
    for _ in 0..count {
        let sample = match depth {
            BitDepth::Eight => Complex::new(i16::from(payload.get_i8()), i16::from(payload.get_i8())),
            BitDepth::Sixteen => Complex::new(payload.get_i16(), payload.get_i16()),
        };
        out.push(sample);
    }
    count
}
