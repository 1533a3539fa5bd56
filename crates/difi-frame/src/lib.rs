//! DIFI/VITA-49 packet codecs for the link-efficient cartesian profile.
//!
//! This is the wire layer of difi. It covers:
//! - the 32-bit header word (static bits, mod-16 sequence, word count)
//! - 28-byte-prologue signal data packets with 8- or 16-bit I/Q lanes
//! - 72- and 108-byte context packets, picked by length on receive
//! - 44.20 fixed-point rates and picosecond timestamps
//! - re-framing of a TCP byte stream into whole packets
//!
//! Everything is big-endian and built on `bytes`.

pub mod codec;
pub mod context;
pub mod error;
pub mod fixed;
pub mod header;
pub mod packet;
pub mod reader;
pub mod sample;
pub mod timestamp;

pub use codec::{check_packet_length, split_packet, FrameConfig, DEFAULT_MAX_PACKET};
pub use context::{
    AlternateContext, ContextFields, ContextPacket, ContextProfile, StandardContext,
    ALTERNATE_CONTEXT_SIZE, ALTERNATE_DEFAULT_CIF, DEFAULT_STATE_AND_EVENT, STANDARD_CONTEXT_SIZE,
};
pub use error::{FrameError, Result};
pub use header::{
    next_sequence, PacketHeader, PacketKind, CONTEXT_STATIC_BITS, DATA_STATIC_BITS,
    SEQUENCE_MODULO,
};
pub use packet::{DataPacket, Packet, DATA_HEADER_SIZE};
pub use reader::PacketReader;
pub use sample::{BitDepth, PAYLOAD_FORMAT_16_BIT, PAYLOAD_FORMAT_8_BIT};
pub use timestamp::{Timestamp, TimestampEngine, PICOS_PER_SECOND};
