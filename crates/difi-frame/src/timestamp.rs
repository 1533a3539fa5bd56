//! Absolute packet time (integer seconds plus picoseconds) and the engine
//! that extrapolates it from a reference by elapsed packet count.

use std::fmt;

/// Picoseconds in one second; `frac` always stays below this.
pub const PICOS_PER_SECOND: u64 = 1_000_000_000_000;

/// Integer-seconds plus picosecond-fraction timestamp.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    full: u32,
    frac: u64,
}

impl Timestamp {
    /// Build a timestamp, carrying any whole seconds out of `frac`.
    pub fn new(full: u32, frac: u64) -> Self {
        let carry = (frac / PICOS_PER_SECOND) as u32;
        Self {
            full: full.wrapping_add(carry),
            frac: frac % PICOS_PER_SECOND,
        }
    }

    /// Whole seconds.
    pub fn full(&self) -> u32 {
        self.full
    }

    /// Fractional part in picoseconds.
    pub fn frac(&self) -> u64 {
        self.frac
    }

    /// Add a non-negative duration in seconds.
    ///
    /// The fraction carries at most one second into `full`; `full` wraps.
    pub fn add_seconds(self, seconds: f64) -> Self {
        if seconds.is_nan() || seconds <= 0.0 {
            return self;
        }
        let whole = seconds.trunc();
        let picos = (((seconds - whole) * PICOS_PER_SECOND as f64) as u64).min(PICOS_PER_SECOND - 1);

        let mut frac = self.frac + picos;
        let mut full = self.full;
        if frac >= PICOS_PER_SECOND {
            frac -= PICOS_PER_SECOND;
            full = full.wrapping_add(1);
        }
        full = full.wrapping_add(whole as u64 as u32);
        Self { full, frac }
    }

    /// Seconds as a float. Loses sub-microsecond precision for epoch times.
    pub fn as_secs_f64(&self) -> f64 {
        f64::from(self.full) + self.frac as f64 / PICOS_PER_SECOND as f64
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:012}", self.full, self.frac)
    }
}

/// Rolling time reference for one stream direction.
///
/// The reference is authoritative; every packet after it is labelled by
/// extrapolating `packets_since_reference × samples_per_packet / sample_rate`.
#[derive(Debug, Clone)]
pub struct TimestampEngine {
    reference: Timestamp,
    samples_per_packet: u32,
    sample_rate: f64,
    packets_since_reference: u64,
}

impl TimestampEngine {
    pub fn new(reference: Timestamp, samples_per_packet: u32, sample_rate: f64) -> Self {
        Self {
            reference,
            samples_per_packet,
            sample_rate,
            packets_since_reference: 0,
        }
    }

    /// Duration of one packet in seconds.
    pub fn packet_duration(&self) -> f64 {
        if self.sample_rate > 0.0 {
            f64::from(self.samples_per_packet) / self.sample_rate
        } else {
            0.0
        }
    }

    /// Timestamp of the packet about to be sent or labelled.
    pub fn advance(&self) -> Timestamp {
        let elapsed = self.packets_since_reference as f64 * self.packet_duration();
        self.reference.add_seconds(elapsed)
    }

    /// Count one packet against the current reference.
    pub fn mark_packet(&mut self) {
        self.packets_since_reference += 1;
    }

    /// Install a new authoritative reference.
    pub fn reset(&mut self, reference: Timestamp) {
        self.reference = reference;
        self.packets_since_reference = 0;
    }

    /// Change the packet size. Time already elapsed is folded into the
    /// reference so earlier packets keep their duration.
    pub fn set_samples_per_packet(&mut self, samples_per_packet: u32) {
        let now = self.advance();
        self.reset(now);
        self.samples_per_packet = samples_per_packet;
    }

    pub fn reference(&self) -> Timestamp {
        self.reference
    }

    pub fn packets_since_reference(&self) -> u64 {
        self.packets_since_reference
    }

    pub fn samples_per_packet(&self) -> u32 {
        self.samples_per_packet
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }
}
