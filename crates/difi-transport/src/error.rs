use std::net::SocketAddr;

/// Errors that can occur in DIFI socket operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// A socket option could not be applied.
    #[error("failed to set socket option {option}: {source}")]
    SocketOption {
        option: &'static str,
        source: std::io::Error,
    },

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A datagram or stream write sent fewer bytes than the packet holds.
    #[error("partial send ({sent} of {expected} bytes)")]
    PartialSend { sent: usize, expected: usize },

    /// The TCP peer went away. Recoverable by reconnecting or re-accepting.
    #[error("peer disconnected")]
    Disconnected,
}

impl TransportError {
    /// Whether the stream can continue after this error by re-establishing
    /// the connection on a later step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Disconnected)
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
