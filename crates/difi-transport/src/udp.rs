//! Datagram transport: one DIFI packet per datagram.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, error, trace};

use crate::error::{Result, TransportError};
use crate::sockopt::set_recv_buffer_size;

/// Default receive buffer per datagram. Large enough for jumbo frames.
pub const DEFAULT_DATAGRAM_SIZE: usize = 9000;

/// Default kernel receive buffer requested for ingress sockets.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 2_000_000;

/// Sends datagrams to a fixed destination from an ephemeral local port.
#[derive(Debug)]
pub struct UdpSender {
    socket: UdpSocket,
    dest: SocketAddr,
}

impl UdpSender {
    /// Create a sender for `dest`, bound to an ephemeral port of the same
    /// address family.
    pub fn connect(dest: SocketAddr) -> Result<Self> {
        let local = match dest.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };
        let socket = UdpSocket::bind(local).map_err(|source| {
            error!(addr = %local, error = %source, "could not create UDP socket");
            TransportError::Bind {
                addr: local,
                source,
            }
        })?;
        debug!(dest = %dest, "UDP sender ready");
        Ok(Self { socket, dest })
    }

    /// Send one packet as a single datagram. A short send is an error.
    pub fn send(&self, packet: &[u8]) -> Result<()> {
        let sent = self.socket.send_to(packet, self.dest).map_err(|e| {
            error!(dest = %self.dest, error = %e, "UDP send failed");
            TransportError::Io(e)
        })?;
        if sent != packet.len() {
            error!(sent, expected = packet.len(), "UDP send truncated");
            return Err(TransportError::PartialSend {
                sent,
                expected: packet.len(),
            });
        }
        trace!(dest = %self.dest, bytes = sent, "sent datagram");
        Ok(())
    }

    /// Destination address.
    pub fn dest(&self) -> SocketAddr {
        self.dest
    }

    /// Local address of the sending socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

/// Receives datagrams on a bound socket with a bounded wait per call.
#[derive(Debug)]
pub struct UdpReceiver {
    socket: UdpSocket,
    local_addr: SocketAddr,
    buf: Vec<u8>,
}

impl UdpReceiver {
    /// Bind with the default datagram and kernel buffer sizes.
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self> {
        Self::bind_with(
            addr,
            read_timeout,
            DEFAULT_DATAGRAM_SIZE,
            DEFAULT_RECV_BUFFER_SIZE,
        )
    }

    /// Bind with explicit datagram size and kernel receive buffer size.
    pub fn bind_with(
        addr: SocketAddr,
        read_timeout: Duration,
        datagram_size: usize,
        recv_buffer_size: usize,
    ) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(|source| {
            error!(addr = %addr, error = %source, "could not bind UDP port, port may be in use");
            TransportError::Bind { addr, source }
        })?;
        set_recv_buffer_size(&socket, recv_buffer_size)?;
        socket
            .set_read_timeout(Some(read_timeout.max(Duration::from_millis(1))))
            .map_err(|source| TransportError::SocketOption {
                option: "SO_RCVTIMEO",
                source,
            })?;
        let local_addr = socket.local_addr()?;
        debug!(local_addr = %local_addr, "UDP receiver bound");

        Ok(Self {
            socket,
            local_addr,
            buf: vec![0u8; datagram_size],
        })
    }

    /// Wait up to the read timeout for one datagram.
    ///
    /// Returns `Ok(None)` when nothing arrived in time.
    pub fn recv(&mut self) -> Result<Option<&[u8]>> {
        match self.socket.recv(&mut self.buf) {
            Ok(n) => {
                trace!(bytes = n, "received datagram");
                Ok(Some(&self.buf[..n]))
            }
            Err(e) if crate::is_timeout(&e) || e.kind() == std::io::ErrorKind::Interrupted => {
                Ok(None)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }

    /// The address this socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn datagram_roundtrip_over_loopback() {
        let mut receiver = UdpReceiver::bind(loopback(), Duration::from_secs(2)).unwrap();
        let sender = UdpSender::connect(receiver.local_addr()).unwrap();

        sender.send(b"difi").unwrap();
        let got = receiver.recv().unwrap().expect("datagram should arrive");
        assert_eq!(got, b"difi");
    }

    #[test]
    fn recv_timeout_reports_nothing_available() {
        let mut receiver = UdpReceiver::bind(loopback(), Duration::from_millis(20)).unwrap();
        assert!(receiver.recv().unwrap().is_none());
    }

    #[test]
    fn datagram_boundaries_are_preserved() {
        let mut receiver = UdpReceiver::bind(loopback(), Duration::from_secs(2)).unwrap();
        let sender = UdpSender::connect(receiver.local_addr()).unwrap();

        sender.send(&[1u8; 72]).unwrap();
        sender.send(&[2u8; 108]).unwrap();

        assert_eq!(receiver.recv().unwrap().unwrap().len(), 72);
        assert_eq!(receiver.recv().unwrap().unwrap().len(), 108);
    }

    #[test]
    fn bind_conflict_is_reported() {
        let first = UdpReceiver::bind(loopback(), Duration::from_millis(10)).unwrap();
        let err = UdpReceiver::bind(first.local_addr(), Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }
}
