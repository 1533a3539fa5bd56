//! Transmit framer: turns a continuous sample stream into timestamped data
//! packets, with context packets interleaved.

use bytes::{Bytes, BytesMut};
use difi_frame::sample::pack_sample;
use difi_frame::{
    next_sequence, AlternateContext, BitDepth, ContextFields, ContextPacket, ContextProfile,
    DataPacket, PacketHeader, StandardContext, Timestamp, TimestampEngine, CONTEXT_STATIC_BITS,
    DATA_HEADER_SIZE, DATA_STATIC_BITS, SEQUENCE_MODULO,
};
use num_complex::Complex;
use tracing::{debug, info, trace, warn};

use crate::config::{OperatingMode, SinkConfig};
use crate::error::{Result, StreamError};
use crate::event::SinkEvent;
use crate::link::{Egress, PacketOutput};

/// Fraction of the sample rate advertised as bandwidth.
const BANDWIDTH_RATIO: f64 = 0.8;

/// DIFI transmitter bound to one output.
///
/// Each call to [`DifiSink::work`] consumes a batch of samples; every time
/// `samples_per_packet` have accumulated a data packet is sent, preceded by
/// a context packet when one is due.
#[derive(Debug)]
pub struct DifiSink<O> {
    output: O,
    mode: OperatingMode,
    depth: BitDepth,
    samples_per_packet: usize,
    context_interval: u64,
    accumulator: BytesMut,
    buffered: usize,
    sequence: u8,
    context_sequence: u8,
    packet_count: u64,
    static_bits: u32,
    stream_id: u32,
    class_id: u64,
    timestamps: TimestampEngine,
    context: ContextFields,
    relay: Option<Bytes>,
    scratch: BytesMut,
}

impl DifiSink<Egress> {
    /// Validate the configuration and open its transport.
    pub fn connect(config: SinkConfig) -> Result<Self> {
        config.validate()?;
        let output = Egress::open(&config)?;
        info!(addr = %config.addr, transport = %config.transport, stream_id = config.stream_id, "DIFI sink ready");
        Self::new(config, output)
    }
}

impl<O: PacketOutput> DifiSink<O> {
    /// Build a sink writing to an already opened output.
    pub fn new(config: SinkConfig, output: O) -> Result<Self> {
        config.validate()?;
        let depth = config.depth()?;
        let profile = config.context_profile()?;
        let samples_per_packet = config.samples_per_packet as usize;

        Ok(Self {
            output,
            mode: config.mode,
            depth,
            samples_per_packet,
            context_interval: u64::from(config.context_interval),
            accumulator: BytesMut::with_capacity(samples_per_packet * depth.bytes_per_sample()),
            buffered: 0,
            sequence: 0,
            context_sequence: 0,
            packet_count: 0,
            static_bits: DATA_STATIC_BITS,
            stream_id: config.stream_id,
            class_id: config.class_id(),
            timestamps: TimestampEngine::new(
                config.reference_time(),
                config.samples_per_packet,
                config.sample_rate,
            ),
            context: context_template(&config, profile, depth),
            relay: None,
            scratch: BytesMut::new(),
        })
    }

    /// Consume a batch of samples, sending every packet that fills up.
    ///
    /// Returns the number of samples consumed: all of them, or zero when the
    /// output is not ready this step (a TCP peer is being reconnected).
    pub fn work(&mut self, samples: &[Complex<i16>]) -> Result<usize> {
        if !self.output.ready()? {
            trace!("output not ready, consuming nothing this step");
            return Ok(0);
        }

        for &sample in samples {
            pack_sample(&mut self.accumulator, sample, self.depth);
            self.buffered += 1;
            if self.buffered == self.samples_per_packet {
                self.emit()?;
            }
        }
        Ok(samples.len())
    }

    /// Apply a host event. It takes effect from the next packet.
    pub fn apply(&mut self, event: SinkEvent) -> Result<()> {
        match event {
            SinkEvent::TimeReference(timestamp) => {
                debug!(%timestamp, "new time reference");
                self.timestamps.reset(timestamp);
            }
            SinkEvent::StaticBits(bits) => {
                debug!(static_bits = format_args!("{bits:#010x}"), "static bits override");
                self.static_bits = bits;
            }
            SinkEvent::Resync {
                sequence,
                packet_len,
                timestamp,
            } => self.resync(sequence, packet_len, timestamp)?,
            SinkEvent::Context {
                packet,
                raw,
                timestamp,
            } => {
                self.stream_id = packet.stream_id;
                self.class_id = packet.fields.class_id();
                self.timestamps.reset(timestamp);
                if self.mode == OperatingMode::Paired {
                    trace!(bytes = raw.len(), "queued context for relay");
                    self.relay = Some(raw);
                } else {
                    debug!("context event in standalone mode, not relayed");
                }
            }
        }
        Ok(())
    }

    fn resync(&mut self, sequence: u8, packet_len: usize, timestamp: Timestamp) -> Result<()> {
        let payload_len = packet_len.saturating_sub(DATA_HEADER_SIZE);
        let bytes_per_sample = self.depth.bytes_per_sample();
        if payload_len % bytes_per_sample != 0 {
            warn!(
                packet_len,
                depth = %self.depth,
                "upstream packet does not hold a whole number of samples, check the bit depth"
            );
        }
        let samples_per_packet = payload_len / bytes_per_sample;
        if samples_per_packet == 0 || (samples_per_packet * bytes_per_sample) % 4 != 0 {
            return Err(StreamError::ProtocolMismatch(format!(
                "cannot follow upstream packets of {packet_len} bytes at {}",
                self.depth
            )));
        }

        warn!(
            sequence,
            samples_per_packet,
            discarded = self.buffered,
            "resynchronizing to upstream stream"
        );
        self.sequence = sequence % SEQUENCE_MODULO;
        self.timestamps.reset(timestamp);
        if samples_per_packet != self.samples_per_packet {
            self.samples_per_packet = samples_per_packet;
            self.timestamps
                .set_samples_per_packet(samples_per_packet as u32);
        }
        self.accumulator.clear();
        self.buffered = 0;
        Ok(())
    }

    fn emit(&mut self) -> Result<()> {
        match self.mode {
            OperatingMode::Standalone => {
                if self.packet_count % self.context_interval == 0 {
                    self.send_context()?;
                }
            }
            OperatingMode::Paired => {
                if let Some(raw) = self.relay.take() {
                    self.output.send(&raw)?;
                    trace!(bytes = raw.len(), "relayed context");
                }
            }
        }

        let packet = DataPacket {
            header: PacketHeader::new(self.static_bits, self.sequence, 0),
            stream_id: self.stream_id,
            class_id: self.class_id,
            timestamp: self.timestamps.advance(),
            payload: self.accumulator.split().freeze(),
        };
        self.scratch.clear();
        packet.encode(&mut self.scratch)?;
        self.output.send(&self.scratch)?;
        trace!(
            sequence = self.sequence,
            timestamp = %packet.timestamp,
            bytes = self.scratch.len(),
            "sent data packet"
        );

        self.sequence = next_sequence(self.sequence);
        self.packet_count += 1;
        self.timestamps.mark_packet();
        self.buffered = 0;
        self.accumulator
            .reserve(self.samples_per_packet * self.depth.bytes_per_sample());
        Ok(())
    }

    fn send_context(&mut self) -> Result<()> {
        let mut fields = self.context.clone();
        fields.set_timestamp(self.timestamps.advance());
        let packet = ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, self.context_sequence, 0),
            stream_id: self.stream_id,
            fields,
        };
        self.scratch.clear();
        packet.encode(&mut self.scratch);
        self.output.send(&self.scratch)?;
        trace!(sequence = self.context_sequence, bytes = self.scratch.len(), "sent context packet");
        self.context_sequence = next_sequence(self.context_sequence);
        Ok(())
    }

    /// Sequence number the next data packet will carry.
    pub fn sequence(&self) -> u8 {
        self.sequence
    }

    /// Data packets sent so far.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Samples waiting for the current packet to fill.
    pub fn buffered(&self) -> usize {
        self.buffered
    }

    pub fn samples_per_packet(&self) -> usize {
        self.samples_per_packet
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn output_mut(&mut self) -> &mut O {
        &mut self.output
    }
}

fn context_template(config: &SinkConfig, profile: ContextProfile, depth: BitDepth) -> ContextFields {
    let bandwidth = config.sample_rate * BANDWIDTH_RATIO;
    match profile {
        ContextProfile::Alternate => ContextFields::Alternate(AlternateContext {
            class_id: config.class_id(),
            bandwidth,
            sample_rate: config.sample_rate,
            payload_format: depth.payload_format(),
            ..AlternateContext::default()
        }),
        ContextProfile::Standard => ContextFields::Standard(StandardContext {
            class_id: config.class_id(),
            reference_point: config.reference_point,
            bandwidth,
            sample_rate: config.sample_rate,
            payload_format: depth.payload_format(),
            ..StandardContext::default()
        }),
    }
}
