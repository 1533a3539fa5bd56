//! The 32-bit packet header word and the stream identifier that follows it.
//!
//! ```text
//!  31       20 19   16 15              0
//! ┌───────────┬───────┬─────────────────┐
//! │ static    │ seq   │ word count      │
//! │ (12 bits) │ mod16 │ (32-bit words)  │
//! └───────────┴───────┴─────────────────┘
//! ```
//! The top nibble of the static bits is the packet type: 1 for signal data,
//! anything else is treated as context.

use bytes::Buf;

use crate::error::{FrameError, Result};

/// Sequence counters wrap at this value.
pub const SEQUENCE_MODULO: u8 = 16;

/// Bytes per 32-bit word.
pub const WORD_BYTES: usize = 4;

/// Size of the header word plus stream identifier.
pub const PREAMBLE_SIZE: usize = 8;

/// Mask selecting the static (profile) bits of a header word.
pub const STATIC_MASK: u32 = 0xFFF0_0000;

/// Default static bits for signal data packets.
pub const DATA_STATIC_BITS: u32 = 0x18E0_0000;

/// Default static bits for context packets.
pub const CONTEXT_STATIC_BITS: u32 = 0x4900_0000;

const DATA_TYPE: u8 = 0x1;

/// Packet type carried in the top nibble of the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Signal data packet with stream identifier.
    Data,
    /// Any other type; the raw nibble is kept for diagnostics.
    Context(u8),
}

impl PacketKind {
    fn from_nibble(nibble: u8) -> Self {
        if nibble == DATA_TYPE {
            PacketKind::Data
        } else {
            PacketKind::Context(nibble)
        }
    }
}

/// Decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub kind: PacketKind,
    /// Rolling packet counter, always in `0..16`.
    pub sequence: u8,
    /// Total packet length in 32-bit words, header included.
    pub word_count: u16,
    /// Top 12 bits of the header word, in place.
    pub static_bits: u32,
}

impl PacketHeader {
    /// Build a header; the kind follows from the static bits.
    pub fn new(static_bits: u32, sequence: u8, word_count: u16) -> Self {
        let static_bits = static_bits & STATIC_MASK;
        Self {
            kind: PacketKind::from_nibble((static_bits >> 28) as u8),
            sequence: sequence % SEQUENCE_MODULO,
            word_count,
            static_bits,
        }
    }

    /// Pack into the wire word.
    pub fn encode(&self) -> u32 {
        (self.static_bits & STATIC_MASK)
            | (u32::from(self.sequence % SEQUENCE_MODULO) << 16)
            | u32::from(self.word_count)
    }

    /// Unpack a wire word.
    pub fn decode(word: u32) -> Self {
        Self {
            kind: PacketKind::from_nibble((word >> 28) as u8),
            sequence: ((word >> 16) & 0xF) as u8,
            word_count: (word & 0xFFFF) as u16,
            static_bits: word & STATIC_MASK,
        }
    }

    pub fn is_data(&self) -> bool {
        self.kind == PacketKind::Data
    }

    /// Packet length in bytes as declared by the word count.
    pub fn packet_bytes(&self) -> usize {
        usize::from(self.word_count) * WORD_BYTES
    }
}

/// The sequence number that should follow `sequence`.
pub fn next_sequence(sequence: u8) -> u8 {
    (sequence % SEQUENCE_MODULO + 1) % SEQUENCE_MODULO
}

/// Read the header word and stream identifier from the front of a unit.
pub fn read_preamble(src: &[u8]) -> Result<(PacketHeader, u32)> {
    if src.len() < PREAMBLE_SIZE {
        return Err(FrameError::Truncated {
            len: src.len(),
            need: PREAMBLE_SIZE,
        });
    }
    let mut cursor = src;
    let header = PacketHeader::decode(cursor.get_u32());
    let stream_id = cursor.get_u32();
    Ok((header, stream_id))
}
