use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use difi_stream::{ReceiveBatch, StreamEvent, TaggedEvent};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    /// Interleaved little-endian 16-bit I/Q, no metadata.
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct BatchOutput {
    offset: u64,
    samples: usize,
    first: Option<[i16; 2]>,
    events: Vec<EventOutput>,
}

#[derive(Serialize, Debug, PartialEq)]
struct EventOutput {
    offset: u64,
    kind: &'static str,
    detail: String,
}

impl From<&TaggedEvent> for EventOutput {
    fn from(tagged: &TaggedEvent) -> Self {
        Self {
            offset: tagged.offset,
            kind: tagged.event.name(),
            detail: event_detail(&tagged.event),
        }
    }
}

#[derive(Serialize)]
pub struct SendSummary {
    pub addr: String,
    pub transport: &'static str,
    pub stream_id: u32,
    pub packets: u64,
    pub samples: u64,
    pub next_sequence: u8,
}

/// Print one receive step. `offset` is the absolute index of the batch's
/// first sample.
pub fn print_batch(batch: &ReceiveBatch, offset: u64, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = BatchOutput {
                offset,
                samples: batch.samples.len(),
                first: batch.samples.first().map(|s| [s.re, s.im]),
                events: batch.events.iter().map(EventOutput::from).collect(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "KIND", "DETAIL"])
                .add_row(vec![
                    offset.to_string(),
                    "samples".to_string(),
                    batch.samples.len().to_string(),
                ]);
            for event in batch.events.iter().map(EventOutput::from) {
                table.add_row(vec![event.offset.to_string(), event.kind.to_string(), event.detail]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("offset={} samples={}", offset, batch.samples.len());
            for event in batch.events.iter().map(EventOutput::from) {
                println!("  @{} {}: {}", event.offset, event.kind, event.detail);
            }
        }
        OutputFormat::Raw => {
            let mut data = Vec::with_capacity(batch.samples.len() * 4);
            for sample in &batch.samples {
                data.extend_from_slice(&sample.re.to_le_bytes());
                data.extend_from_slice(&sample.im.to_le_bytes());
            }
            print_raw(&data);
        }
    }
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(summary).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ADDR", "TRANSPORT", "STREAM", "PACKETS", "SAMPLES"])
                .add_row(vec![
                    summary.addr.clone(),
                    summary.transport.to_string(),
                    format!("{:#010x}", summary.stream_id),
                    summary.packets.to_string(),
                    summary.samples.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "sent {} packets ({} samples) to {} over {} stream={:#010x}",
                summary.packets, summary.samples, summary.addr, summary.transport, summary.stream_id
            );
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn event_detail(event: &StreamEvent) -> String {
    match event {
        StreamEvent::SequenceGap {
            expected,
            observed,
            packet_len,
            timestamp,
        } => format!("expected={expected} observed={observed} len={packet_len} time={timestamp}"),
        StreamEvent::Context {
            packet, timestamp, ..
        } => format!(
            "profile={} stream={:#010x} rate={} bandwidth={} depth={} time={}",
            packet.profile(),
            packet.stream_id,
            packet.fields.sample_rate(),
            packet.fields.bandwidth(),
            packet.fields.payload_bit_depth(),
            timestamp
        ),
        StreamEvent::StaticChange { static_bits } => format!("static_bits={static_bits:#010x}"),
    }
}
