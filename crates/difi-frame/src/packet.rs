//! Signal data packets and the decoded-once [`Packet`] union.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_complex::Complex;

use crate::context::ContextPacket;
use crate::error::{FrameError, Result};
use crate::header::{read_preamble, PacketHeader, WORD_BYTES};
use crate::sample::{unpack_samples, BitDepth};
use crate::timestamp::Timestamp;

/// Bytes before the first sample: header, stream id, class id, seconds,
/// picoseconds.
pub const DATA_HEADER_SIZE: usize = 28;

/// A signal data packet.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPacket {
    pub header: PacketHeader,
    pub stream_id: u32,
    pub class_id: u64,
    pub timestamp: Timestamp,
    /// Packed samples, a whole number of 32-bit words.
    pub payload: Bytes,
}

impl DataPacket {
    /// Append the encoded packet to `dst`. The header word count is
    /// computed from the payload length.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let len = self.payload.len();
        if len % WORD_BYTES != 0 {
            return Err(FrameError::UnalignedPayload { len });
        }
        let size = DATA_HEADER_SIZE + len;
        let word_count = u16::try_from(size / WORD_BYTES).map_err(|_| FrameError::PacketTooLarge {
            size,
            max: usize::from(u16::MAX) * WORD_BYTES,
        })?;

        let header = PacketHeader {
            word_count,
            ..self.header
        };
        dst.reserve(size);
        dst.put_u32(header.encode());
        dst.put_u32(self.stream_id);
        dst.put_u64(self.class_id);
        dst.put_u32(self.timestamp.full());
        dst.put_u64(self.timestamp.frac());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode a whole data unit. The header word count must cover exactly
    /// the bytes received; everything after the prologue is payload.
    pub fn decode(unit: Bytes) -> Result<Self> {
        if unit.len() < DATA_HEADER_SIZE {
            return Err(FrameError::Truncated {
                len: unit.len(),
                need: DATA_HEADER_SIZE,
            });
        }
        let (header, stream_id) = read_preamble(&unit)?;
        if header.packet_bytes() != unit.len() {
            return Err(FrameError::LengthMismatch {
                declared: header.packet_bytes(),
                actual: unit.len(),
            });
        }
        let mut fixed = &unit[8..DATA_HEADER_SIZE];
        let class_id = fixed.get_u64();
        let full = fixed.get_u32();
        let frac = fixed.get_u64();

        Ok(Self {
            header,
            stream_id,
            class_id,
            timestamp: Timestamp::new(full, frac),
            payload: unit.slice(DATA_HEADER_SIZE..),
        })
    }

    /// Whole samples in the payload at `depth`.
    pub fn sample_count(&self, depth: BitDepth) -> usize {
        self.payload.len() / depth.bytes_per_sample()
    }

    /// Decode up to `max` samples into `out`, returning how many were added.
    pub fn samples(&self, depth: BitDepth, max: usize, out: &mut Vec<Complex<i16>>) -> usize {
        unpack_samples(&self.payload, depth, max, out)
    }

    pub fn wire_size(&self) -> usize {
        DATA_HEADER_SIZE + self.payload.len()
    }
}

/// A received unit, decoded once by packet type.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    Data(DataPacket),
    Context(ContextPacket),
}

impl Packet {
    /// Decode a unit, dispatching on the header type nibble.
    pub fn decode(unit: Bytes) -> Result<Self> {
        let (header, _) = read_preamble(&unit)?;
        if header.is_data() {
            DataPacket::decode(unit).map(Packet::Data)
        } else {
            ContextPacket::decode(&unit).map(Packet::Context)
        }
    }

    pub fn header(&self) -> &PacketHeader {
        match self {
            Packet::Data(p) => &p.header,
            Packet::Context(p) => &p.header,
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            Packet::Data(p) => p.stream_id,
            Packet::Context(p) => p.stream_id,
        }
    }
}
