//! UDP and TCP socket plumbing for DIFI/VITA-49 packet streams.
//!
//! This is the lowest layer of the workspace. It knows nothing about packet
//! layouts; it only moves bytes with bounded waits:
//! - [`UdpSender`] / [`UdpReceiver`] carry one packet per datagram
//! - [`TcpClient`] is a reconnecting egress stream
//! - [`TcpServer`] accepts a single ingress client at a time
//!
//! Every blocking call is bounded by a timeout so that a caller driving a
//! stream one step at a time never stalls indefinitely.

pub mod error;
pub mod kind;
mod sockopt;
pub mod tcp;
pub mod udp;

pub use error::{Result, TransportError};
pub use kind::TransportKind;
pub use tcp::{TcpClient, TcpServer};
pub use udp::{UdpReceiver, UdpSender, DEFAULT_DATAGRAM_SIZE};

/// Whether an I/O error only means "nothing arrived before the timeout".
pub fn is_timeout(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Whether an I/O error means the TCP peer has gone away.
pub fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::NotConnected
            | std::io::ErrorKind::UnexpectedEof
    )
}
