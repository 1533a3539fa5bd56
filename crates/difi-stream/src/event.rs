//! Out-of-band metadata exchanged with the host alongside sample batches.

use bytes::Bytes;
use difi_frame::{ContextPacket, Timestamp};
use num_complex::Complex;

/// Something the receiver observed that the host may want to act on.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A data packet arrived out of sequence.
    SequenceGap {
        /// Sequence number that should have arrived.
        expected: u8,
        /// Sequence number that did arrive.
        observed: u8,
        /// Byte length of the packet that arrived.
        packet_len: usize,
        /// Timestamp of the packet that arrived.
        timestamp: Timestamp,
    },
    /// A context packet preceded the data packet this batch came from.
    Context {
        packet: ContextPacket,
        /// The unit exactly as received, for relaying.
        raw: Bytes,
        /// The packet's own timestamp, or for the alternate profile the
        /// timestamp of the last data packet.
        timestamp: Timestamp,
    },
    /// The data packet static bits differ from the previous packet's.
    StaticChange { static_bits: u32 },
}

impl StreamEvent {
    /// Short name for display.
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::SequenceGap { .. } => "sequence_gap",
            StreamEvent::Context { .. } => "context",
            StreamEvent::StaticChange { .. } => "static_change",
        }
    }
}

/// An event positioned at the absolute sample index it applies from.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub offset: u64,
    pub event: StreamEvent,
}

/// Output of one receive step.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReceiveBatch {
    pub samples: Vec<Complex<i16>>,
    pub events: Vec<TaggedEvent>,
}

impl ReceiveBatch {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.events.is_empty()
    }
}

/// Host-driven update to a transmitter. Takes effect on the next packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    /// Install a new authoritative time reference.
    TimeReference(Timestamp),
    /// Override the data packet static bits.
    StaticBits(u32),
    /// Follow an upstream sequence gap.
    Resync {
        sequence: u8,
        packet_len: usize,
        timestamp: Timestamp,
    },
    /// Relay an upstream context packet and adopt its identity and time.
    Context {
        packet: ContextPacket,
        raw: Bytes,
        timestamp: Timestamp,
    },
}

impl From<StreamEvent> for SinkEvent {
    /// Map a receiver event onto the update a paired transmitter needs.
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::SequenceGap {
                observed,
                packet_len,
                timestamp,
                ..
            } => SinkEvent::Resync {
                sequence: observed,
                packet_len,
                timestamp,
            },
            StreamEvent::Context {
                packet,
                raw,
                timestamp,
            } => SinkEvent::Context {
                packet,
                raw,
                timestamp,
            },
            StreamEvent::StaticChange { static_bits } => SinkEvent::StaticBits(static_bits),
        }
    }
}
