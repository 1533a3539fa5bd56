//! Construction-time stream configuration.
//!
//! Both configs deserialize with every field optional; missing fields take
//! the [`Default`] value. [`SinkConfig::validate`] and
//! [`SourceConfig::validate`] reject anything that cannot describe a working
//! stream, and the framers call them before touching a socket.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use difi_frame::{
    BitDepth, ContextProfile, Timestamp, DATA_HEADER_SIZE, DEFAULT_MAX_PACKET, PICOS_PER_SECOND,
};
use difi_transport::udp::DEFAULT_RECV_BUFFER_SIZE;
use difi_transport::{TransportKind, DEFAULT_DATAGRAM_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Default port for both directions.
pub const DEFAULT_PORT: u16 = 50000;

/// OUI written into the class identifier by default (the DIFI consortium).
pub const DEFAULT_OUI: u32 = 0x6A_621E;

/// What a receiver does with a context packet, or a unit from a foreign
/// stream, that disagrees with its configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPolicy {
    /// Stop the stream with an error.
    #[default]
    Fail,
    /// Drop the offending unit without logging.
    Ignore,
    /// Log a warning and pass the unit on anyway.
    WarnForward,
    /// Log a warning, drop the unit and hold back samples until a compliant
    /// context arrives.
    WarnWithhold,
}

impl ContextPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextPolicy::Fail => "fail",
            ContextPolicy::Ignore => "ignore",
            ContextPolicy::WarnForward => "warn_forward",
            ContextPolicy::WarnWithhold => "warn_withhold",
        }
    }
}

impl fmt::Display for ContextPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ContextPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "fail" => Ok(ContextPolicy::Fail),
            "ignore" => Ok(ContextPolicy::Ignore),
            "warn_forward" => Ok(ContextPolicy::WarnForward),
            "warn_withhold" => Ok(ContextPolicy::WarnWithhold),
            other => Err(format!("unknown context policy: {other}")),
        }
    }
}

/// Where a sink's timing and context come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// The sink keeps its own clock and emits context packets periodically.
    #[default]
    Standalone,
    /// Timing and context are relayed from an upstream source via events.
    Paired,
}

/// Transmit side configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Destination address.
    pub addr: SocketAddr,
    pub transport: TransportKind,
    /// Stream identifier written into every packet.
    pub stream_id: u32,
    /// Bits per I/Q lane, 8 or 16.
    pub bit_depth: u8,
    pub samples_per_packet: u32,
    /// Context packet size in bytes, 72 or 108.
    pub context_size: usize,
    /// In standalone mode, a context packet precedes every n-th data packet.
    pub context_interval: u32,
    /// Packet class code, low 32 bits of the class identifier.
    pub packet_class: u32,
    /// Organizationally unique identifier, high bits of the class identifier.
    pub oui: u32,
    /// Reference point field of the standard context profile.
    pub reference_point: u32,
    /// Samples per second.
    pub sample_rate: f64,
    /// Whole seconds of the initial time reference.
    pub reference_full: u32,
    /// Picoseconds of the initial time reference.
    pub reference_frac: u64,
    pub mode: OperatingMode,
    /// Bound on one TCP reconnect attempt.
    pub connect_timeout_ms: u64,
    /// Bound on one blocking TCP write.
    pub write_timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_PORT),
            transport: TransportKind::Udp,
            stream_id: 0,
            bit_depth: 16,
            samples_per_packet: 1000,
            context_size: ContextProfile::Standard.size(),
            context_interval: 1000,
            packet_class: 0,
            oui: DEFAULT_OUI,
            reference_point: 0,
            sample_rate: 1_000_000.0,
            reference_full: 0,
            reference_frac: 0,
            mode: OperatingMode::Standalone,
            connect_timeout_ms: 10,
            write_timeout_ms: 1000,
        }
    }
}

impl SinkConfig {
    /// Check that the configuration describes a stream the sink can emit.
    pub fn validate(&self) -> Result<()> {
        let depth = self.depth()?;
        self.context_profile()?;

        if self.samples_per_packet < 2 {
            return Err(StreamError::Config(format!(
                "samples_per_packet must be at least 2 (got {})",
                self.samples_per_packet
            )));
        }
        let payload = self.samples_per_packet as usize * depth.bytes_per_sample();
        if payload % 4 != 0 {
            return Err(StreamError::Config(format!(
                "{} samples at {depth} is {payload} bytes, not a whole number of 32-bit words",
                self.samples_per_packet
            )));
        }
        if DATA_HEADER_SIZE + payload > DEFAULT_MAX_PACKET {
            return Err(StreamError::Config(format!(
                "{} samples at {depth} exceed the largest packet ({DEFAULT_MAX_PACKET} bytes)",
                self.samples_per_packet
            )));
        }
        if self.mode == OperatingMode::Standalone && self.context_interval == 0 {
            return Err(StreamError::Config(
                "context_interval must be at least 1 in standalone mode".into(),
            ));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(StreamError::Config(format!(
                "sample_rate must be positive (got {})",
                self.sample_rate
            )));
        }
        if self.reference_frac >= PICOS_PER_SECOND {
            return Err(StreamError::Config(format!(
                "reference_frac must be below {PICOS_PER_SECOND} picoseconds"
            )));
        }
        Ok(())
    }

    pub fn depth(&self) -> Result<BitDepth> {
        BitDepth::try_from(self.bit_depth).map_err(|e| StreamError::Config(e.to_string()))
    }

    pub fn context_profile(&self) -> Result<ContextProfile> {
        ContextProfile::from_size(self.context_size).map_err(|e| StreamError::Config(e.to_string()))
    }

    /// Class identifier carried by data and context packets.
    pub fn class_id(&self) -> u64 {
        (u64::from(self.oui) << 32) ^ u64::from(self.packet_class)
    }

    pub fn reference_time(&self) -> Timestamp {
        Timestamp::new(self.reference_full, self.reference_frac)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms.max(1))
    }
}

/// Receive side configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Local address to bind.
    pub addr: SocketAddr,
    pub transport: TransportKind,
    /// Only accept units from this stream. `None` accepts any.
    pub stream_id: Option<u32>,
    /// Bits per I/Q lane, 8 or 16.
    pub bit_depth: u8,
    pub context_policy: ContextPolicy,
    /// Longest a single step waits for a packet.
    pub read_timeout_ms: u64,
    /// UDP receive buffer per datagram.
    pub datagram_size: usize,
    /// Kernel receive buffer requested for UDP.
    pub recv_buffer_size: usize,
    /// Largest TCP packet accepted by the re-framer.
    pub max_packet_size: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            transport: TransportKind::Udp,
            stream_id: None,
            bit_depth: 16,
            context_policy: ContextPolicy::Fail,
            read_timeout_ms: 100,
            datagram_size: DEFAULT_DATAGRAM_SIZE,
            recv_buffer_size: DEFAULT_RECV_BUFFER_SIZE,
            max_packet_size: DEFAULT_MAX_PACKET,
        }
    }
}

impl SourceConfig {
    /// Check that the configuration describes a stream the source can read.
    pub fn validate(&self) -> Result<()> {
        self.depth()?;
        if self.datagram_size < DATA_HEADER_SIZE {
            return Err(StreamError::Config(format!(
                "datagram_size must hold at least a {DATA_HEADER_SIZE}-byte prologue"
            )));
        }
        if self.max_packet_size < DATA_HEADER_SIZE {
            return Err(StreamError::Config(format!(
                "max_packet_size must hold at least a {DATA_HEADER_SIZE}-byte prologue"
            )));
        }
        Ok(())
    }

    pub fn depth(&self) -> Result<BitDepth> {
        BitDepth::try_from(self.bit_depth).map_err(|e| StreamError::Config(e.to_string()))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms.max(1))
    }
}
