//! Receive framer: validates incoming units and turns them back into a
//! sample stream with positioned events.

use bytes::Bytes;
use difi_frame::header::read_preamble;
use difi_frame::{
    next_sequence, BitDepth, ContextFields, ContextPacket, DataPacket, Packet, Timestamp,
};
use tracing::{debug, error, info, trace, warn};

use crate::config::{ContextPolicy, SourceConfig};
use crate::error::{Result, StreamError};
use crate::event::{ReceiveBatch, StreamEvent, TaggedEvent};
use crate::link::{Ingress, PacketInput};

/// A decoded context held until the next data packet.
#[derive(Debug, Clone)]
struct PendingContext {
    packet: ContextPacket,
    raw: Bytes,
    timestamp: Timestamp,
}

/// Which check a unit failed.
#[derive(Debug, Clone, Copy)]
enum Mismatch {
    /// The unit belongs to another stream.
    Stream,
    /// The context is malformed or describes a different stream format.
    Context,
}

/// What to do with a unit after a policy decision.
enum Verdict {
    Keep,
    Drop,
}

/// DIFI receiver bound to one input.
#[derive(Debug)]
pub struct DifiSource<I> {
    input: I,
    expected_stream_id: Option<u32>,
    depth: BitDepth,
    policy: ContextPolicy,
    last_sequence: Option<u8>,
    last_static: Option<u32>,
    last_timestamp: Timestamp,
    pending: Option<PendingContext>,
    withholding: bool,
    samples_delivered: u64,
}

impl DifiSource<Ingress> {
    /// Validate the configuration and bind its transport.
    pub fn bind(config: SourceConfig) -> Result<Self> {
        config.validate()?;
        let input = Ingress::bind(&config)?;
        info!(local_addr = %input.local_addr(), transport = %config.transport, "DIFI source ready");
        Self::new(config, input)
    }

    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.input.local_addr()
    }
}

impl<I: PacketInput> DifiSource<I> {
    /// Build a source reading from an already bound input.
    pub fn new(config: SourceConfig, input: I) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            input,
            expected_stream_id: config.stream_id,
            depth: config.depth()?,
            policy: config.context_policy,
            last_sequence: None,
            last_static: None,
            last_timestamp: Timestamp::default(),
            pending: None,
            withholding: false,
            samples_delivered: 0,
        })
    }

    /// Run one receive step, returning at most `requested` samples.
    ///
    /// Pulls units until one data packet has been handled or the input has
    /// nothing more this step. Context units never yield samples on their
    /// own; they are attached to the next data packet as an event.
    pub fn work(&mut self, requested: usize) -> Result<ReceiveBatch> {
        let mut batch = ReceiveBatch::default();

        while let Some(unit) = self.input.next_unit()? {
            let packet = match Packet::decode(unit.clone()) {
                Ok(packet) => packet,
                Err(e) => match read_preamble(&unit) {
                    Ok((header, _)) if !header.is_data() => {
                        self.mismatch(Mismatch::Context, format!("malformed context packet: {e}"))?;
                        continue;
                    }
                    _ => {
                        warn!(error = %e, bytes = unit.len(), "dropping malformed unit");
                        break;
                    }
                },
            };

            if let Some(expected) = self.expected_stream_id {
                let stream_id = packet.stream_id();
                if stream_id != expected {
                    let reason = format!("got stream id {stream_id}, expected {expected}");
                    if let Verdict::Drop = self.mismatch(Mismatch::Stream, reason)? {
                        break;
                    }
                }
            }

            match packet {
                Packet::Data(data) => {
                    self.receive_data(data, unit.len(), requested, &mut batch);
                    break;
                }
                Packet::Context(context) => self.receive_context(context, unit)?,
            }
        }

        self.samples_delivered += batch.samples.len() as u64;
        Ok(batch)
    }

    fn receive_data(
        &mut self,
        packet: DataPacket,
        packet_len: usize,
        requested: usize,
        batch: &mut ReceiveBatch,
    ) {
        let header = packet.header;
        let offset = self.samples_delivered;
        let mut tag = |event| batch.events.push(TaggedEvent { offset, event });

        if self.last_static != Some(header.static_bits) {
            debug!(static_bits = format_args!("{:#010x}", header.static_bits), "static bits changed");
            self.last_static = Some(header.static_bits);
            tag(StreamEvent::StaticChange {
                static_bits: header.static_bits,
            });
        }

        if let Some(last) = self.last_sequence {
            let expected = next_sequence(last);
            if header.sequence != expected {
                warn!(
                    expected,
                    observed = header.sequence,
                    "got an out of order packet"
                );
                tag(StreamEvent::SequenceGap {
                    expected,
                    observed: header.sequence,
                    packet_len,
                    timestamp: packet.timestamp,
                });
            }
        }
        self.last_sequence = Some(header.sequence);
        self.last_timestamp = packet.timestamp;

        if let Some(pending) = self.pending.take() {
            tag(StreamEvent::Context {
                packet: pending.packet,
                raw: pending.raw,
                timestamp: pending.timestamp,
            });
        }

        if packet.payload.len() % self.depth.bytes_per_sample() != 0 {
            warn!(
                payload = packet.payload.len(),
                depth = %self.depth,
                "payload is not a whole number of samples, check the bit depth"
            );
        }

        if self.withholding {
            trace!(sequence = header.sequence, "withholding samples until a compliant context arrives");
            return;
        }
        let decoded = packet.samples(self.depth, requested, &mut batch.samples);
        trace!(sequence = header.sequence, samples = decoded, "decoded data packet");
    }

    fn receive_context(&mut self, packet: ContextPacket, raw: Bytes) -> Result<()> {
        let advertised = packet.fields.payload_bit_depth();
        let compliant = advertised == self.depth.bits();
        if !compliant {
            let reason = format!(
                "context advertises {advertised}-bit samples, stream is configured for {}",
                self.depth
            );
            if let Verdict::Drop = self.mismatch(Mismatch::Context, reason)? {
                return Ok(());
            }
        } else if self.withholding {
            info!("compliant context received, resuming sample delivery");
            self.withholding = false;
        }

        let timestamp = match &packet.fields {
            ContextFields::Standard(fields) => fields.timestamp,
            ContextFields::Alternate(_) => self.last_timestamp,
        };
        trace!(profile = %packet.profile(), sequence = packet.header.sequence, "context packet pending");
        self.pending = Some(PendingContext {
            packet,
            raw,
            timestamp,
        });
        Ok(())
    }

    /// Apply the mismatch policy to a disagreeing unit. Only a context
    /// mismatch can start withholding; a foreign unit is just dropped.
    fn mismatch(&mut self, kind: Mismatch, reason: String) -> Result<Verdict> {
        match self.policy {
            ContextPolicy::Fail => {
                error!(%reason, "protocol mismatch, check your configuration");
                Err(StreamError::ProtocolMismatch(reason))
            }
            ContextPolicy::Ignore => Ok(Verdict::Drop),
            ContextPolicy::WarnForward => {
                warn!(%reason, "protocol mismatch, forwarding anyway");
                Ok(Verdict::Keep)
            }
            ContextPolicy::WarnWithhold => match kind {
                Mismatch::Context => {
                    warn!(%reason, "protocol mismatch, withholding samples");
                    self.withholding = true;
                    Ok(Verdict::Drop)
                }
                Mismatch::Stream => {
                    warn!(%reason, "protocol mismatch, dropping unit");
                    Ok(Verdict::Drop)
                }
            },
        }
    }

    /// Total samples delivered so far; the offset of the next batch.
    pub fn samples_delivered(&self) -> u64 {
        self.samples_delivered
    }

    /// Whether samples are being held back by the `warn_withhold` policy.
    pub fn is_withholding(&self) -> bool {
        self.withholding
    }

    pub fn input(&self) -> &I {
        &self.input
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use bytes::BytesMut;
    use difi_frame::sample::pack_samples;
    use difi_frame::{
        AlternateContext, PacketHeader, StandardContext, CONTEXT_STATIC_BITS, DATA_STATIC_BITS,
        PAYLOAD_FORMAT_8_BIT,
    };
    use num_complex::Complex;

    use super::*;

    #[derive(Debug, Default)]
    struct Replay {
        units: VecDeque<Bytes>,
    }

    impl PacketInput for Replay {
        fn next_unit(&mut self) -> Result<Option<Bytes>> {
            Ok(self.units.pop_front())
        }
    }

    fn replay(units: Vec<Bytes>) -> Replay {
        Replay {
            units: units.into(),
        }
    }

    fn source(policy: ContextPolicy, units: Vec<Bytes>) -> DifiSource<Replay> {
        let config = SourceConfig {
            context_policy: policy,
            ..SourceConfig::default()
        };
        DifiSource::new(config, replay(units)).expect("config is valid")
    }

    fn data(sequence: u8, stream_id: u32, samples: &[Complex<i16>], depth: BitDepth) -> Bytes {
        let mut payload = BytesMut::new();
        pack_samples(&mut payload, samples, depth);
        let mut out = BytesMut::new();
        DataPacket {
            header: PacketHeader::new(DATA_STATIC_BITS, sequence, 0),
            stream_id,
            class_id: 0,
            timestamp: Timestamp::new(10, u64::from(sequence)),
            payload: payload.freeze(),
        }
        .encode(&mut out)
        .expect("payload is aligned");
        out.freeze()
    }

    fn data16(sequence: u8) -> Bytes {
        data(sequence, 0, &ramp(4), BitDepth::Sixteen)
    }

    fn context(payload_format: u64) -> Bytes {
        let mut out = BytesMut::new();
        ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, 0, 0),
            stream_id: 0,
            fields: ContextFields::Standard(StandardContext {
                timestamp: Timestamp::new(3, 4),
                payload_format,
                ..StandardContext::default()
            }),
        }
        .encode(&mut out);
        out.freeze()
    }

    fn ramp(n: i16) -> Vec<Complex<i16>> {
        (0..n).map(|i| Complex::new(i, i + 100)).collect()
    }

    fn gaps(batch: &ReceiveBatch) -> Vec<(u8, u8)> {
        batch
            .events
            .iter()
            .filter_map(|e| match e.event {
                StreamEvent::SequenceGap {
                    expected, observed, ..
                } => Some((expected, observed)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn decodes_samples_from_data_packets() {
        let mut src = source(ContextPolicy::Fail, vec![data16(0)]);
        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples, ramp(4));
        assert_eq!(src.samples_delivered(), 4);
    }

    #[test]
    fn requested_count_limits_samples() {
        let mut src = source(ContextPolicy::Fail, vec![data16(0)]);
        let batch = src.work(3).unwrap();
        assert_eq!(batch.samples, ramp(3));
    }

    #[test]
    fn empty_input_yields_empty_batch() {
        let mut src = source(ContextPolicy::Fail, Vec::new());
        assert!(src.work(16).unwrap().is_empty());
    }

    #[test]
    fn single_gap_reports_expected_sequence() {
        let units = [0, 1, 2, 4, 5].into_iter().map(data16).collect();
        let mut src = source(ContextPolicy::Fail, units);

        let mut all = Vec::new();
        for _ in 0..5 {
            let batch = src.work(1024).unwrap();
            all.extend(gaps(&batch));
        }
        assert_eq!(all, vec![(3, 4)]);
    }

    #[test]
    fn gap_carries_packet_length_and_time_at_absolute_offset() {
        let mut src = source(ContextPolicy::Fail, vec![data16(7), data16(9)]);
        src.work(1024).unwrap();
        let batch = src.work(1024).unwrap();

        let gap = batch
            .events
            .iter()
            .find(|e| matches!(e.event, StreamEvent::SequenceGap { .. }))
            .expect("gap event");
        assert_eq!(gap.offset, 4);
        assert_eq!(
            gap.event,
            StreamEvent::SequenceGap {
                expected: 8,
                observed: 9,
                packet_len: 28 + 16,
                timestamp: Timestamp::new(10, 9),
            }
        );
    }

    #[test]
    fn sequence_wraps_without_gap() {
        let units = [14, 15, 0, 1].into_iter().map(data16).collect();
        let mut src = source(ContextPolicy::Fail, units);
        for _ in 0..4 {
            assert!(gaps(&src.work(1024).unwrap()).is_empty());
        }
    }

    #[test]
    fn first_packet_reports_static_bits_only_once() {
        let mut src = source(ContextPolicy::Fail, vec![data16(0), data16(1)]);
        let first = src.work(1024).unwrap();
        assert_eq!(
            first.events,
            vec![TaggedEvent {
                offset: 0,
                event: StreamEvent::StaticChange {
                    static_bits: DATA_STATIC_BITS
                },
            }]
        );
        assert!(src.work(1024).unwrap().events.is_empty());
    }

    #[test]
    fn static_change_is_reported() {
        let mut changed = BytesMut::from(&data16(1)[..]);
        changed[0] = 0x18;
        changed[1] = 0x71;
        let mut src = source(ContextPolicy::Fail, vec![data16(0), changed.freeze()]);
        src.work(1024).unwrap();
        let batch = src.work(1024).unwrap();
        assert_eq!(
            batch.events,
            vec![TaggedEvent {
                offset: 4,
                event: StreamEvent::StaticChange {
                    static_bits: 0x1870_0000
                },
            }]
        );
    }

    #[test]
    fn context_is_attached_to_next_data_packet() {
        let ctx = context(difi_frame::PAYLOAD_FORMAT_16_BIT);
        let mut src = source(ContextPolicy::Fail, vec![data16(0), ctx.clone(), data16(1)]);
        src.work(1024).unwrap();

        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples.len(), 4);
        assert_eq!(batch.events.len(), 1);
        let TaggedEvent {
            offset,
            event: StreamEvent::Context { raw, timestamp, .. },
        } = &batch.events[0]
        else {
            panic!("expected context event");
        };
        assert_eq!(*offset, 4);
        assert_eq!(raw, &ctx);
        assert_eq!(*timestamp, Timestamp::new(3, 4));
    }

    #[test]
    fn alternate_context_takes_last_data_timestamp() {
        let mut alt = BytesMut::new();
        ContextPacket {
            header: PacketHeader::new(CONTEXT_STATIC_BITS, 0, 0),
            stream_id: 0,
            fields: ContextFields::Alternate(AlternateContext::default()),
        }
        .encode(&mut alt);
        let mut src = source(ContextPolicy::Fail, vec![data16(5), alt.freeze(), data16(6)]);
        src.work(1024).unwrap();
        let batch = src.work(1024).unwrap();
        let StreamEvent::Context { timestamp, .. } = &batch.events[0].event else {
            panic!("expected context event");
        };
        assert_eq!(*timestamp, Timestamp::new(10, 5));
    }

    #[test]
    fn context_alone_yields_no_samples_and_stays_pending() {
        let mut src = source(
            ContextPolicy::Fail,
            vec![context(difi_frame::PAYLOAD_FORMAT_16_BIT)],
        );
        assert!(src.work(1024).unwrap().is_empty());
        assert!(src.pending.is_some());
    }

    #[test]
    fn bit_depth_mismatch_fails_under_fail_policy() {
        let mut src = source(
            ContextPolicy::Fail,
            vec![context(PAYLOAD_FORMAT_8_BIT), data16(0)],
        );
        let err = src.work(1024).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolMismatch(_)));
    }

    #[test]
    fn bit_depth_mismatch_ignored_keeps_decoding_at_sixteen_bits() {
        let mut src = source(
            ContextPolicy::Ignore,
            vec![context(PAYLOAD_FORMAT_8_BIT), data16(0)],
        );
        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples, ramp(4));
        assert!(batch
            .events
            .iter()
            .all(|e| !matches!(e.event, StreamEvent::Context { .. })));
    }

    #[test]
    fn bit_depth_mismatch_forwarded_under_warn_forward() {
        let mut src = source(
            ContextPolicy::WarnForward,
            vec![context(PAYLOAD_FORMAT_8_BIT), data16(0)],
        );
        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples.len(), 4);
        assert!(batch
            .events
            .iter()
            .any(|e| matches!(e.event, StreamEvent::Context { .. })));
    }

    #[test]
    fn withhold_policy_holds_samples_until_compliant_context() {
        let units = vec![
            context(PAYLOAD_FORMAT_8_BIT),
            data16(0),
            data16(1),
            context(difi_frame::PAYLOAD_FORMAT_16_BIT),
            data16(2),
        ];
        let mut src = source(ContextPolicy::WarnWithhold, units);

        let first = src.work(1024).unwrap();
        assert!(first.samples.is_empty());
        assert!(src.is_withholding());
        assert!(src.work(1024).unwrap().samples.is_empty());

        let resumed = src.work(1024).unwrap();
        assert_eq!(resumed.samples, ramp(4));
        assert!(!src.is_withholding());
        assert!(gaps(&resumed).is_empty());
        assert_eq!(src.samples_delivered(), 4);
    }

    #[test]
    fn malformed_context_length_follows_policy() {
        let short = Bytes::from(vec![0x49, 0x00, 0x00, 0x0A, 0, 0, 0, 0, 0, 0, 0, 0]);
        let mut fail = source(ContextPolicy::Fail, vec![short.clone(), data16(0)]);
        assert!(fail.work(1024).is_err());

        let mut ignore = source(ContextPolicy::Ignore, vec![short, data16(0)]);
        assert_eq!(ignore.work(1024).unwrap().samples.len(), 4);
    }

    #[test]
    fn data_unit_with_trailing_bytes_is_dropped() {
        let mut padded = BytesMut::from(&data16(0)[..]);
        padded.extend_from_slice(&[0xEE; 16]);
        let mut src = source(ContextPolicy::Fail, vec![padded.freeze(), data16(1)]);

        assert!(src.work(1024).unwrap().is_empty());
        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples, ramp(4));
        assert_eq!(src.samples_delivered(), 4);
    }

    fn with_stream(policy: ContextPolicy, units: Vec<Bytes>) -> DifiSource<Replay> {
        let config = SourceConfig {
            stream_id: Some(7),
            context_policy: policy,
            ..SourceConfig::default()
        };
        DifiSource::new(config, replay(units)).unwrap()
    }

    /// Samples per step for own(0), foreign, own(1), own(2); `None` for a
    /// step that returned an error.
    fn steps_around_foreign_unit(policy: ContextPolicy) -> (Vec<Option<usize>>, bool) {
        let own = |seq| data(seq, 7, &ramp(4), BitDepth::Sixteen);
        let foreign = data(0, 99, &ramp(4), BitDepth::Sixteen);
        let mut src = with_stream(policy, vec![own(0), foreign, own(1), own(2)]);
        let counts = (0..4)
            .map(|_| src.work(1024).ok().map(|b| b.samples.len()))
            .collect();
        (counts, src.is_withholding())
    }

    #[test]
    fn foreign_unit_under_ignore_drops_only_that_unit() {
        let (counts, withholding) = steps_around_foreign_unit(ContextPolicy::Ignore);
        assert_eq!(counts, vec![Some(4), Some(0), Some(4), Some(4)]);
        assert!(!withholding);
    }

    #[test]
    fn foreign_unit_under_warn_withhold_does_not_stall_the_stream() {
        let (counts, withholding) = steps_around_foreign_unit(ContextPolicy::WarnWithhold);
        assert_eq!(counts, vec![Some(4), Some(0), Some(4), Some(4)]);
        assert!(!withholding);
    }

    #[test]
    fn foreign_unit_under_warn_forward_is_delivered() {
        let (counts, withholding) = steps_around_foreign_unit(ContextPolicy::WarnForward);
        assert_eq!(counts, vec![Some(4), Some(4), Some(4), Some(4)]);
        assert!(!withholding);
    }

    #[test]
    fn foreign_unit_under_fail_errors_once_then_recovers() {
        let (counts, withholding) = steps_around_foreign_unit(ContextPolicy::Fail);
        assert_eq!(counts, vec![Some(4), None, Some(4), Some(4)]);
        assert!(!withholding);
    }

    #[test]
    fn foreign_context_under_warn_withhold_does_not_withhold() {
        let mut foreign_ctx = BytesMut::from(&context(difi_frame::PAYLOAD_FORMAT_16_BIT)[..]);
        foreign_ctx[4..8].copy_from_slice(&99u32.to_be_bytes());
        let units = vec![foreign_ctx.freeze(), data(0, 7, &ramp(4), BitDepth::Sixteen)];
        let mut src = with_stream(ContextPolicy::WarnWithhold, units);

        assert!(src.work(1024).unwrap().is_empty());
        let batch = src.work(1024).unwrap();
        assert_eq!(batch.samples, ramp(4));
        assert!(batch
            .events
            .iter()
            .all(|e| !matches!(e.event, StreamEvent::Context { .. })));
    }

    #[test]
    fn matching_stream_is_accepted() {
        let mut src = with_stream(
            ContextPolicy::Fail,
            vec![data(0, 7, &ramp(4), BitDepth::Sixteen)],
        );
        assert_eq!(src.work(1024).unwrap().samples.len(), 4);
    }

    #[test]
    fn eight_bit_stream_decodes() {
        let config = SourceConfig {
            bit_depth: 8,
            ..SourceConfig::default()
        };
        let mut src = DifiSource::new(
            config,
            replay(vec![data(0, 0, &ramp(8), BitDepth::Eight)]),
        )
        .unwrap();
        assert_eq!(src.work(1024).unwrap().samples, ramp(8));
    }
}
