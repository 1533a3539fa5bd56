/// Errors that can occur while running a DIFI stream.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The configuration cannot describe a working stream.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A received unit disagrees with the configured stream under the
    /// `fail` policy.
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] difi_transport::TransportError),

    /// Packet codec error.
    #[error("frame error: {0}")]
    Frame(#[from] difi_frame::FrameError),
}

pub type Result<T> = std::result::Result<T, StreamError>;
