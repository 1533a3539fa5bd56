/// Errors that can occur while encoding, decoding or re-framing packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The unit is shorter than the fixed part of its packet type.
    #[error("packet truncated ({len} bytes, need at least {need})")]
    Truncated { len: usize, need: usize },

    /// A header declared a zero-length packet, which can never be framed.
    #[error("packet header declares zero words")]
    ZeroWordCount,

    /// The header word count disagrees with the bytes actually present.
    #[error("packet header declares {declared} bytes but {actual} are present")]
    LengthMismatch { declared: usize, actual: usize },

    /// A payload that does not fill a whole number of 32-bit words.
    #[error("payload of {len} bytes is not a whole number of 32-bit words")]
    UnalignedPayload { len: usize },

    /// A context unit whose size matches neither supported profile.
    #[error("unsupported context packet size {0} bytes (expected 72 or 108)")]
    UnsupportedContextSize(usize),

    /// A sample bit depth other than 8 or 16.
    #[error("unsupported bit depth {0} (expected 8 or 16)")]
    UnsupportedBitDepth(u8),

    /// The packet exceeds the configured maximum size.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed; any partial packet was discarded.
    #[error("connection closed (incomplete packet discarded)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
