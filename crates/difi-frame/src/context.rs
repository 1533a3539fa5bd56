//! Context packets in the two supported sizes.
//!
//! Both profiles share the header word and stream identifier; everything
//! after that is laid out by a fixed offset table. The standard (108-byte)
//! profile carries its own timestamp, the alternate (72-byte) one does not.
//! On receive the profile is picked from the unit length, which is unique
//! per profile.

use std::fmt;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::fixed;
use crate::header::{read_preamble, PacketHeader};
use crate::sample::{payload_format_bit_depth, BitDepth};
use crate::timestamp::Timestamp;

/// Size of the alternate context profile.
pub const ALTERNATE_CONTEXT_SIZE: usize = 72;

/// Size of the standard context profile.
pub const STANDARD_CONTEXT_SIZE: usize = 108;

/// State and event indicator word written by default.
pub const DEFAULT_STATE_AND_EVENT: u32 = 0xA00A_0000;

/// Context indicator field written by default in the alternate profile.
pub const ALTERNATE_DEFAULT_CIF: u32 = 0x39A1_8000;

/// Field offsets of the alternate profile.
mod alternate {
    pub const CLASS_ID: usize = 8;
    pub const CIF: usize = 16;
    pub const BANDWIDTH: usize = 20;
    pub const IF_REFERENCE_FREQUENCY: usize = 28;
    pub const RF_REFERENCE_FREQUENCY: usize = 36;
    pub const IF_BAND_OFFSET: usize = 44;
    pub const SAMPLE_RATE: usize = 52;
    pub const STATE_AND_EVENT: usize = 60;
    pub const PAYLOAD_FORMAT: usize = 64;
}

/// Field offsets of the standard profile.
mod standard {
    pub const CLASS_ID: usize = 8;
    pub const FULL_SECONDS: usize = 16;
    pub const FRACTIONAL_SECONDS: usize = 20;
    pub const CIF: usize = 28;
    pub const REFERENCE_POINT: usize = 32;
    pub const BANDWIDTH: usize = 36;
    pub const IF_REFERENCE_FREQUENCY: usize = 44;
    pub const RF_REFERENCE_FREQUENCY: usize = 52;
    pub const IF_BAND_OFFSET: usize = 60;
    pub const REFERENCE_LEVEL: usize = 68;
    pub const GAIN: usize = 72;
    pub const SAMPLE_RATE: usize = 76;
    pub const TIMESTAMP_ADJUSTMENT: usize = 84;
    pub const TIMESTAMP_CALIBRATION: usize = 92;
    pub const STATE_AND_EVENT: usize = 96;
    pub const PAYLOAD_FORMAT: usize = 100;
}

/// Which of the two context layouts a packet uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ContextProfile {
    /// 72 bytes, no timestamp.
    Alternate,
    /// 108 bytes with timestamp.
    #[default]
    Standard,
}

impl ContextProfile {
    pub fn size(self) -> usize {
        match self {
            ContextProfile::Alternate => ALTERNATE_CONTEXT_SIZE,
            ContextProfile::Standard => STANDARD_CONTEXT_SIZE,
        }
    }

    /// Profile for a unit of `size` bytes.
    pub fn from_size(size: usize) -> Result<Self> {
        match size {
            ALTERNATE_CONTEXT_SIZE => Ok(ContextProfile::Alternate),
            STANDARD_CONTEXT_SIZE => Ok(ContextProfile::Standard),
            other => Err(FrameError::UnsupportedContextSize(other)),
        }
    }

    /// Header word count for this profile.
    pub fn word_count(self) -> u16 {
        (self.size() / 4) as u16
    }
}

impl fmt::Display for ContextProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextProfile::Alternate => write!(f, "alternate ({ALTERNATE_CONTEXT_SIZE} bytes)"),
            ContextProfile::Standard => write!(f, "standard ({STANDARD_CONTEXT_SIZE} bytes)"),
        }
    }
}

/// Body of a 72-byte context packet.
#[derive(Debug, Clone, PartialEq)]
pub struct AlternateContext {
    pub class_id: u64,
    pub cif: u32,
    /// Hz.
    pub bandwidth: f64,
    pub if_reference_frequency: u64,
    pub rf_reference_frequency: u64,
    pub if_band_offset: u64,
    /// Samples per second.
    pub sample_rate: f64,
    pub state_and_event: u32,
    pub payload_format: u64,
}

impl Default for AlternateContext {
    fn default() -> Self {
        Self {
            class_id: 0,
            cif: ALTERNATE_DEFAULT_CIF,
            bandwidth: 0.0,
            if_reference_frequency: 0,
            rf_reference_frequency: 0,
            if_band_offset: 0,
            sample_rate: 0.0,
            state_and_event: DEFAULT_STATE_AND_EVENT,
            payload_format: BitDepth::default().payload_format(),
        }
    }
}

/// Body of a 108-byte context packet.
#[derive(Debug, Clone, PartialEq)]
pub struct StandardContext {
    pub class_id: u64,
    pub timestamp: Timestamp,
    pub cif: u32,
    pub reference_point: u32,
    /// Hz.
    pub bandwidth: f64,
    pub if_reference_frequency: u64,
    pub rf_reference_frequency: u64,
    pub if_band_offset: u64,
    pub reference_level: u32,
    pub gain: u32,
    /// Samples per second.
    pub sample_rate: f64,
    pub timestamp_adjustment: u64,
    pub timestamp_calibration: u32,
    pub state_and_event: u32,
    pub payload_format: u64,
}

impl Default for StandardContext {
    fn default() -> Self {
        Self {
            class_id: 0,
            timestamp: Timestamp::default(),
            cif: 0,
            reference_point: 0,
            bandwidth: 0.0,
            if_reference_frequency: 0,
            rf_reference_frequency: 0,
            if_band_offset: 0,
            reference_level: 0,
            gain: 0,
            sample_rate: 0.0,
            timestamp_adjustment: 0,
            timestamp_calibration: 0,
            state_and_event: DEFAULT_STATE_AND_EVENT,
            payload_format: BitDepth::default().payload_format(),
        }
    }
}

/// Profile-specific body of a context packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextFields {
    Alternate(AlternateContext),
    Standard(StandardContext),
}

impl ContextFields {
    pub fn profile(&self) -> ContextProfile {
        match self {
            ContextFields::Alternate(_) => ContextProfile::Alternate,
            ContextFields::Standard(_) => ContextProfile::Standard,
        }
    }

    pub fn class_id(&self) -> u64 {
        match self {
            ContextFields::Alternate(c) => c.class_id,
            ContextFields::Standard(c) => c.class_id,
        }
    }

    pub fn bandwidth(&self) -> f64 {
        match self {
            ContextFields::Alternate(c) => c.bandwidth,
            ContextFields::Standard(c) => c.bandwidth,
        }
    }

    pub fn sample_rate(&self) -> f64 {
        match self {
            ContextFields::Alternate(c) => c.sample_rate,
            ContextFields::Standard(c) => c.sample_rate,
        }
    }

    pub fn payload_format(&self) -> u64 {
        match self {
            ContextFields::Alternate(c) => c.payload_format,
            ContextFields::Standard(c) => c.payload_format,
        }
    }

    /// Bit depth advertised by the payload format word (not validated).
    pub fn payload_bit_depth(&self) -> u8 {
        payload_format_bit_depth(self.payload_format())
    }

    /// Timestamp carried by the packet; only the standard profile has one.
    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            ContextFields::Alternate(_) => None,
            ContextFields::Standard(c) => Some(c.timestamp),
        }
    }

    /// Stamp the packet. No-op for the alternate profile.
    pub fn set_timestamp(&mut self, timestamp: Timestamp) {
        if let ContextFields::Standard(c) = self {
            c.timestamp = timestamp;
        }
    }
}

/// A decoded or to-be-encoded context packet.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextPacket {
    pub header: PacketHeader,
    pub stream_id: u32,
    pub fields: ContextFields,
}

impl ContextPacket {
    pub fn profile(&self) -> ContextProfile {
        self.fields.profile()
    }

    /// Append the encoded packet to `dst`.
    ///
    /// The header word count always reflects the profile size; fields the
    /// body does not model are written as zero.
    pub fn encode(&self, dst: &mut BytesMut) {
        let profile = self.profile();
        let start = dst.len();
        dst.resize(start + profile.size(), 0);
        let out = &mut dst[start..];

        let header = PacketHeader {
            word_count: profile.word_count(),
            ..self.header
        };
        put_u32_at(out, 0, header.encode());
        put_u32_at(out, 4, self.stream_id);

        match &self.fields {
            ContextFields::Alternate(c) => {
                use alternate::*;
                put_u64_at(out, CLASS_ID, c.class_id);
                put_u32_at(out, CIF, c.cif);
                put_u64_at(out, BANDWIDTH, fixed::from_f64(c.bandwidth));
                put_u64_at(out, IF_REFERENCE_FREQUENCY, c.if_reference_frequency);
                put_u64_at(out, RF_REFERENCE_FREQUENCY, c.rf_reference_frequency);
                put_u64_at(out, IF_BAND_OFFSET, c.if_band_offset);
                put_u64_at(out, SAMPLE_RATE, fixed::from_f64(c.sample_rate));
                put_u32_at(out, STATE_AND_EVENT, c.state_and_event);
                put_u64_at(out, PAYLOAD_FORMAT, c.payload_format);
            }
            ContextFields::Standard(c) => {
                use standard::*;
                put_u64_at(out, CLASS_ID, c.class_id);
                put_u32_at(out, FULL_SECONDS, c.timestamp.full());
                put_u64_at(out, FRACTIONAL_SECONDS, c.timestamp.frac());
                put_u32_at(out, CIF, c.cif);
                put_u32_at(out, REFERENCE_POINT, c.reference_point);
                put_u64_at(out, BANDWIDTH, fixed::from_f64(c.bandwidth));
                put_u64_at(out, IF_REFERENCE_FREQUENCY, c.if_reference_frequency);
                put_u64_at(out, RF_REFERENCE_FREQUENCY, c.rf_reference_frequency);
                put_u64_at(out, IF_BAND_OFFSET, c.if_band_offset);
                put_u32_at(out, REFERENCE_LEVEL, c.reference_level);
                put_u32_at(out, GAIN, c.gain);
                put_u64_at(out, SAMPLE_RATE, fixed::from_f64(c.sample_rate));
                put_u64_at(out, TIMESTAMP_ADJUSTMENT, c.timestamp_adjustment);
                put_u32_at(out, TIMESTAMP_CALIBRATION, c.timestamp_calibration);
                put_u32_at(out, STATE_AND_EVENT, c.state_and_event);
                put_u64_at(out, PAYLOAD_FORMAT, c.payload_format);
            }
        }
    }

    /// Decode a whole context unit, choosing the profile by its length.
    pub fn decode(src: &[u8]) -> Result<Self> {
        let profile = ContextProfile::from_size(src.len())?;
        let (header, stream_id) = read_preamble(src)?;

        let fields = match profile {
            ContextProfile::Alternate => {
                use alternate::*;
                ContextFields::Alternate(AlternateContext {
                    class_id: u64_at(src, CLASS_ID),
                    cif: u32_at(src, CIF),
                    bandwidth: fixed::to_f64(u64_at(src, BANDWIDTH)),
                    if_reference_frequency: u64_at(src, IF_REFERENCE_FREQUENCY),
                    rf_reference_frequency: u64_at(src, RF_REFERENCE_FREQUENCY),
                    if_band_offset: u64_at(src, IF_BAND_OFFSET),
                    sample_rate: fixed::to_f64(u64_at(src, SAMPLE_RATE)),
                    state_and_event: u32_at(src, STATE_AND_EVENT),
                    payload_format: u64_at(src, PAYLOAD_FORMAT),
                })
            }
            ContextProfile::Standard => {
                use standard::*;
                ContextFields::Standard(StandardContext {
                    class_id: u64_at(src, CLASS_ID),
                    timestamp: Timestamp::new(
                        u32_at(src, FULL_SECONDS),
                        u64_at(src, FRACTIONAL_SECONDS),
                    ),
                    cif: u32_at(src, CIF),
                    reference_point: u32_at(src, REFERENCE_POINT),
                    bandwidth: fixed::to_f64(u64_at(src, BANDWIDTH)),
                    if_reference_frequency: u64_at(src, IF_REFERENCE_FREQUENCY),
                    rf_reference_frequency: u64_at(src, RF_REFERENCE_FREQUENCY),
                    if_band_offset: u64_at(src, IF_BAND_OFFSET),
                    reference_level: u32_at(src, REFERENCE_LEVEL),
                    gain: u32_at(src, GAIN),
                    sample_rate: fixed::to_f64(u64_at(src, SAMPLE_RATE)),
                    timestamp_adjustment: u64_at(src, TIMESTAMP_ADJUSTMENT),
                    timestamp_calibration: u32_at(src, TIMESTAMP_CALIBRATION),
                    state_and_event: u32_at(src, STATE_AND_EVENT),
                    payload_format: u64_at(src, PAYLOAD_FORMAT),
                })
            }
        };

        Ok(Self {
            header,
            stream_id,
            fields,
        })
    }

    /// Wire size of the encoded packet.
    pub fn wire_size(&self) -> usize {
        self.profile().size()
    }
}

// Offsets come from the tables above and are always in bounds for the
// profile's size, which is checked before any field is touched.
fn u32_at(src: &[u8], offset: usize) -> u32 {
    (&src[offset..]).get_u32()
}

fn u64_at(src: &[u8], offset: usize) -> u64 {
    (&src[offset..]).get_u64()
}

fn put_u32_at(dst: &mut [u8], offset: usize, value: u32) {
    (&mut dst[offset..]).put_u32(value);
}

fn put_u64_at(dst: &mut [u8], offset: usize, value: u64) {
    (&mut dst[offset..]).put_u64(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{PacketKind, CONTEXT_STATIC_BITS};
    use crate::sample::PAYLOAD_FORMAT_8_BIT;

    fn standard_packet() -> ContextPacket {
        ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, 5, 0),
            stream_id: 0xDEAD_BEEF,
            fields: ContextFields::Standard(StandardContext {
                class_id: 0x7C386C << 32,
                timestamp: Timestamp::new(1_700_000_000, 123_456_789_012),
                reference_point: 100,
                bandwidth: 8_000_000.0,
                if_reference_frequency: 1,
                rf_reference_frequency: 2,
                if_band_offset: 3,
                reference_level: 4,
                gain: 5,
                sample_rate: 10_000_000.0,
                timestamp_adjustment: 6,
                timestamp_calibration: 7,
                payload_format: PAYLOAD_FORMAT_8_BIT,
                ..StandardContext::default()
            }),
        }
    }

    #[test]
    fn standard_profile_roundtrip() {
        let packet = standard_packet();
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        assert_eq!(buf.len(), STANDARD_CONTEXT_SIZE);

        let decoded = ContextPacket::decode(&buf).unwrap();
        assert_eq!(decoded.header.word_count, 27);
        assert_eq!(decoded.header.sequence, 5);
        assert!(matches!(decoded.header.kind, PacketKind::Context(4)));
        assert_eq!(decoded.stream_id, packet.stream_id);
        assert_eq!(decoded.fields, packet.fields);
        assert_eq!(decoded.fields.payload_bit_depth(), 8);
    }

    #[test]
    fn alternate_profile_roundtrip() {
        let packet = ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, 15, 0),
            stream_id: 7,
            fields: ContextFields::Alternate(AlternateContext {
                class_id: 42,
                bandwidth: 800_000.0,
                sample_rate: 1_000_000.0,
                if_reference_frequency: 9,
                ..AlternateContext::default()
            }),
        };
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);
        assert_eq!(buf.len(), ALTERNATE_CONTEXT_SIZE);

        let decoded = ContextPacket::decode(&buf).unwrap();
        assert_eq!(decoded.header.word_count, 18);
        assert_eq!(decoded.fields, packet.fields);
        assert_eq!(decoded.fields.timestamp(), None);
        assert_eq!(decoded.fields.payload_bit_depth(), 16);
    }

    #[test]
    fn standard_fields_land_at_their_offsets() {
        let mut buf = BytesMut::new();
        standard_packet().encode(&mut buf);

        assert_eq!(u32_at(&buf, 4), 0xDEAD_BEEF);
        assert_eq!(u32_at(&buf, standard::FULL_SECONDS), 1_700_000_000);
        assert_eq!(u32_at(&buf, standard::REFERENCE_POINT), 100);
        assert_eq!(u64_at(&buf, standard::SAMPLE_RATE), 10_000_000 << 20);
        assert_eq!(u64_at(&buf, standard::BANDWIDTH), 8_000_000 << 20);
        assert_eq!(u32_at(&buf, standard::STATE_AND_EVENT), DEFAULT_STATE_AND_EVENT);
        assert_eq!(u64_at(&buf, standard::PAYLOAD_FORMAT), PAYLOAD_FORMAT_8_BIT);
    }

    #[test]
    fn alternate_defaults_on_the_wire() {
        let packet = ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, 0, 0),
            stream_id: 0,
            fields: ContextFields::Alternate(AlternateContext::default()),
        };
        let mut buf = BytesMut::new();
        packet.encode(&mut buf);

        assert_eq!(u32_at(&buf, 0), 0x4900_0012);
        assert_eq!(u32_at(&buf, alternate::CIF), 0x39A1_8000);
        assert_eq!(u32_at(&buf, alternate::STATE_AND_EVENT), 0xA00A_0000);
        assert_eq!(u64_at(&buf, alternate::PAYLOAD_FORMAT), 0xA000_01CF_0000_0000);
    }

    #[test]
    fn other_sizes_are_rejected() {
        for size in [0, 8, 71, 73, 100, 107, 109, 256] {
            let err = ContextPacket::decode(&vec![0u8; size]).unwrap_err();
            assert!(matches!(err, FrameError::UnsupportedContextSize(s) if s == size));
        }
    }

    #[test]
    fn set_timestamp_only_touches_standard() {
        let mut fields = ContextFields::Alternate(AlternateContext::default());
        fields.set_timestamp(Timestamp::new(1, 2));
        assert_eq!(fields.timestamp(), None);

        let mut fields = ContextFields::Standard(StandardContext::default());
        fields.set_timestamp(Timestamp::new(1, 2));
        assert_eq!(fields.timestamp(), Some(Timestamp::new(1, 2)));
    }

    #[test]
    fn profile_sizes() {
        assert_eq!(ContextProfile::from_size(72).unwrap(), ContextProfile::Alternate);
        assert_eq!(ContextProfile::from_size(108).unwrap(), ContextProfile::Standard);
        assert_eq!(ContextProfile::Alternate.word_count(), 18);
        assert_eq!(ContextProfile::Standard.word_count(), 27);
    }
}
