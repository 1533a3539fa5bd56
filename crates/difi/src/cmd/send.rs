use std::f64::consts::TAU;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use difi_stream::{DifiSink, SinkConfig};
use num_complex::Complex;
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, load_config, SendArgs};
use crate::exit::{stream_error, CliResult, SUCCESS};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = sink_config(&args)?;
    let rate = config.sample_rate;
    let addr = config.addr;
    let transport = config.transport;
    let stream_id = config.stream_id;

    let mut sink = DifiSink::connect(config).map_err(|err| stream_error("sink setup failed", err))?;
    let running = install_ctrlc_handler()?;

    let spp = sink.samples_per_packet();
    let mut tone = Tone::new(args.tone, rate, args.amplitude);
    let mut chunk = Vec::with_capacity(spp);
    let started = Instant::now();

    while running.load(Ordering::SeqCst) {
        if args.packets.is_some_and(|limit| sink.packet_count() >= limit) {
            break;
        }
        if chunk.is_empty() {
            tone.fill(&mut chunk, spp);
        }

        let consumed = sink
            .work(&chunk)
            .map_err(|err| stream_error("send failed", err))?;
        if consumed == 0 {
            debug!("output not ready, retrying");
            continue;
        }
        chunk.clear();

        if args.realtime {
            let due = Duration::from_secs_f64(sink.packet_count() as f64 * spp as f64 / rate);
            if let Some(wait) = due.checked_sub(started.elapsed()) {
                thread::sleep(wait);
            }
        }
    }

    let packets = sink.packet_count();
    info!(packets, elapsed_ms = started.elapsed().as_millis() as u64, "send finished");
    print_send_summary(
        &SendSummary {
            addr: addr.to_string(),
            transport: transport.as_str(),
            stream_id,
            packets,
            samples: packets * spp as u64,
            next_sequence: sink.sequence(),
        },
        format,
    );
    Ok(SUCCESS)
}

fn sink_config(args: &SendArgs) -> CliResult<SinkConfig> {
    let mut config: SinkConfig = load_config(args.config.as_deref())?;
    config.addr = args.addr;
    if let Some(transport) = args.transport {
        config.transport = transport;
    }
    if let Some(stream_id) = args.stream_id {
        config.stream_id = stream_id;
    }
    if let Some(bit_depth) = args.bit_depth {
        config.bit_depth = bit_depth;
    }
    if let Some(spp) = args.samples_per_packet {
        config.samples_per_packet = spp;
    }
    if let Some(size) = args.context_size {
        config.context_size = size;
    }
    if let Some(interval) = args.context_interval {
        config.context_interval = interval;
    }
    if let Some(rate) = args.sample_rate {
        config.sample_rate = rate;
    }
    if let Some(oui) = args.oui {
        config.oui = oui;
    }
    if let Some(class) = args.packet_class {
        config.packet_class = class;
    }
    Ok(config)
}

/// Complex exponential at a fixed frequency.
struct Tone {
    phase: f64,
    step: f64,
    amplitude: f64,
}

impl Tone {
    fn new(frequency: f64, sample_rate: f64, amplitude: i16) -> Self {
        Self {
            phase: 0.0,
            step: TAU * frequency / sample_rate,
            amplitude: f64::from(amplitude),
        }
    }

    fn fill(&mut self, out: &mut Vec<Complex<i16>>, count: usize) {
        out.extend((0..count).map(|_| {
            let (sin, cos) = self.phase.sin_cos();
            self.phase = (self.phase + self.step) % TAU;
            Complex::new(
                (self.amplitude * cos).round() as i16,
                (self.amplitude * sin).round() as i16,
            )
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use clap::Parser;
    use difi_transport::TransportKind;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: SendArgs,
    }

    fn args(extra: &[&str]) -> SendArgs {
        let mut argv = vec!["send", "10.0.0.1:4991"];
        argv.extend_from_slice(extra);
        Harness::parse_from(argv).args
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = sink_config(&args(&[
            "--transport",
            "tcp",
            "--stream-id",
            "0xBEEF",
            "--spp",
            "250",
            "--context-size",
            "72",
        ]))
        .unwrap();

        assert_eq!(cfg.addr, "10.0.0.1:4991".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.transport, TransportKind::Tcp);
        assert_eq!(cfg.stream_id, 0xBEEF);
        assert_eq!(cfg.samples_per_packet, 250);
        assert_eq!(cfg.context_size, 72);
        assert_eq!(cfg.bit_depth, 16);
        cfg.validate().unwrap();
    }

    #[test]
    fn quarter_rate_tone_walks_the_unit_circle() {
        let mut tone = Tone::new(250.0, 1000.0, 100);
        let mut out = Vec::new();
        tone.fill(&mut out, 5);
        assert_eq!(
            out,
            vec![
                Complex::new(100, 0),
                Complex::new(0, 100),
                Complex::new(-100, 0),
                Complex::new(0, -100),
                Complex::new(100, 0),
            ]
        );
    }

    #[test]
    fn fill_appends() {
        let mut tone = Tone::new(0.0, 1.0, 7);
        let mut out = vec![Complex::new(1, 1)];
        tone.fill(&mut out, 3);
        assert_eq!(out.len(), 4);
        assert!(out[1..].iter().all(|s| *s == Complex::new(7, 0)));
    }
}
