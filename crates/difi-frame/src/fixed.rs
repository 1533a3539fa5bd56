//! VITA 64-bit fixed-point values (44-bit integer part, 20-bit fraction),
//! used for bandwidth and sample rate fields.

/// Number of fractional bits.
pub const RADIX_POINT: u32 = 20;

/// Largest integer part representable in 44 bits.
pub const MAX_INTEGER: u64 = (1 << 44) - 1;

const FRACTION_MASK: u64 = (1 << RADIX_POINT) - 1;
const FRACTION_SCALE: f64 = (1u64 << RADIX_POINT) as f64;

/// Decode a fixed-point field into a float.
pub fn to_f64(bits: u64) -> f64 {
    (bits >> RADIX_POINT) as f64 + (bits & FRACTION_MASK) as f64 / FRACTION_SCALE
}

/// Encode a float as fixed-point, keeping only the integer part.
///
/// Negative and NaN inputs encode as zero; values beyond 44 bits saturate.
pub fn from_f64(value: f64) -> u64 {
    if value.is_nan() || value <= 0.0 {
        return 0;
    }
    let whole = value.trunc();
    let integer = if whole >= MAX_INTEGER as f64 {
        MAX_INTEGER
    } else {
        whole as u64
    };
    integer << RADIX_POINT
}
