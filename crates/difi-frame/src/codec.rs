//! Stream re-framing. Over a byte pipe each packet is self-delimiting: the
//! low 16 bits of its first word give the total length in 32-bit words.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::header::{PacketHeader, WORD_BYTES};

/// Largest packet a 16-bit word count can describe.
pub const DEFAULT_MAX_PACKET: usize = u16::MAX as usize * WORD_BYTES;

/// Split the next complete packet off the front of `src`.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete packet yet.
/// On success, consumes the packet bytes from the buffer.
pub fn split_packet(src: &mut BytesMut, max_packet: usize) -> Result<Option<Bytes>> {
    if src.len() < WORD_BYTES {
        return Ok(None); // Need more data
    }

    let header = PacketHeader::decode((&src[..WORD_BYTES]).get_u32());
    if header.word_count == 0 {
        return Err(FrameError::ZeroWordCount);
    }

    let total = header.packet_bytes();
    if total > max_packet {
        return Err(FrameError::PacketTooLarge {
            size: total,
            max: max_packet,
        });
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    Ok(Some(src.split_to(total).freeze()))
}

/// Check that an outgoing packet's word count matches its length, so a
/// stream peer can re-frame it.
pub fn check_packet_length(packet: &[u8]) -> Result<()> {
    if packet.len() < WORD_BYTES {
        return Err(FrameError::Truncated {
            len: packet.len(),
            need: WORD_BYTES,
        });
    }
    let declared = PacketHeader::decode((&packet[..WORD_BYTES]).get_u32()).packet_bytes();
    if declared == 0 {
        return Err(FrameError::ZeroWordCount);
    }
    if declared != packet.len() {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: packet.len(),
        });
    }
    Ok(())
}

/// Configuration for stream re-framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum packet size in bytes. Default: the 16-bit word count limit.
    pub max_packet_size: usize,
    /// How long one `read_packet` call may wait. `None` blocks until a
    /// packet is complete.
    pub read_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET,
            read_timeout: None,
        }
    }
}
