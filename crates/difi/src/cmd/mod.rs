use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Subcommand};
use difi_stream::ContextPolicy;
use difi_transport::TransportKind;
use serde::de::DeserializeOwned;

use crate::exit::{io_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Transmit a synthetic tone as a DIFI stream.
    Send(SendArgs),
    /// Receive a DIFI stream and print batches and events.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Destination address.
    pub addr: SocketAddr,
    /// JSON sink configuration; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[arg(long, short = 't')]
    pub transport: Option<TransportKind>,
    /// Stream identifier (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u32)]
    pub stream_id: Option<u32>,
    /// Bits per I/Q lane, 8 or 16.
    #[arg(long)]
    pub bit_depth: Option<u8>,
    #[arg(long, alias = "spp")]
    pub samples_per_packet: Option<u32>,
    /// Context packet size in bytes, 72 or 108.
    #[arg(long)]
    pub context_size: Option<usize>,
    /// Send a context packet before every n-th data packet.
    #[arg(long)]
    pub context_interval: Option<u32>,
    /// Samples per second.
    #[arg(long)]
    pub sample_rate: Option<f64>,
    #[arg(long, value_parser = parse_u32)]
    pub oui: Option<u32>,
    #[arg(long, value_parser = parse_u32)]
    pub packet_class: Option<u32>,
    /// Tone frequency in Hz, relative to the sample rate.
    #[arg(long, default_value = "1000")]
    pub tone: f64,
    /// Peak amplitude of each lane.
    #[arg(long, default_value = "8000")]
    pub amplitude: i16,
    /// Stop after N data packets. Default: run until interrupted.
    #[arg(long)]
    pub packets: Option<u64>,
    /// Pace packets to the sample rate instead of sending flat out.
    #[arg(long)]
    pub realtime: bool,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address to bind.
    #[arg(default_value = "0.0.0.0:50000")]
    pub addr: SocketAddr,
    /// JSON source configuration; flags below override its fields.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    #[arg(long, short = 't')]
    pub transport: Option<TransportKind>,
    /// Only accept this stream (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_u32)]
    pub stream_id: Option<u32>,
    /// Bits per I/Q lane, 8 or 16.
    #[arg(long)]
    pub bit_depth: Option<u8>,
    /// fail, ignore, warn-forward or warn-withhold.
    #[arg(long)]
    pub context_policy: Option<ContextPolicy>,
    /// Longest a single receive step waits, in milliseconds.
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,
    /// Samples requested per receive step.
    #[arg(long, default_value = "65536")]
    pub chunk: usize,
    /// Exit after printing N non-empty batches.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a decimal or `0x`-prefixed hex integer.
pub fn parse_u32(input: &str) -> Result<u32, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => input.replace('_', "").parse(),
    };
    parsed.map_err(|err| format!("invalid integer {input:?}: {err}"))
}

/// Read a JSON configuration file, or fall back to defaults.
pub fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> CliResult<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text)
        .map_err(|err| CliError::new(USAGE, format!("invalid config {}: {err}", path.display())))
}

/// Flip `running` to false on Ctrl-C.
pub fn install_ctrlc_handler() -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}
