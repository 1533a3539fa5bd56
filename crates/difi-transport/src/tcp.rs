//! Stream transport: a reconnecting egress client and a single-client
//! ingress server.

use std::io::{ErrorKind, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, TransportError};

/// Default bound on a single reconnect attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(10);

/// Default bound on a single blocking write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Sleep between non-blocking accept attempts.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Egress TCP stream that re-establishes itself after the peer goes away.
///
/// Connection loss is never fatal here: [`TcpClient::ensure_connected`]
/// reports whether the stream is usable for this step, and a later step
/// retries.
#[derive(Debug)]
pub struct TcpClient {
    addr: SocketAddr,
    connect_timeout: Duration,
    write_timeout: Duration,
    stream: Option<TcpStream>,
}

impl TcpClient {
    /// Create a client for `addr` and make a first connection attempt.
    ///
    /// Failure to connect here is not an error; the stream simply starts
    /// out disconnected.
    pub fn new(addr: SocketAddr, connect_timeout: Duration) -> Self {
        let mut client = Self {
            addr,
            connect_timeout,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            stream: None,
        };
        client.ensure_connected();
        client
    }

    /// Override the bound on a single blocking write.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        let applied = self.stream.as_ref().map(|s| configure_stream(s, timeout));
        if let Some(Err(e)) = applied {
            warn!(addr = %self.addr, error = %e, "dropping connection, will reconnect");
            self.stream = None;
        }
        self
    }

    /// Probe the peer and reconnect if it is gone.
    ///
    /// Returns `true` when the stream is usable for this step.
    pub fn ensure_connected(&mut self) -> bool {
        if let Some(stream) = &self.stream {
            if stream.peer_addr().is_ok() {
                return true;
            }
            debug!(addr = %self.addr, "peer probe failed, dropping connection");
            self.stream = None;
        }

        match TcpStream::connect_timeout(&self.addr, self.connect_timeout) {
            Ok(stream) => {
                if let Err(e) = configure_stream(&stream, self.write_timeout) {
                    warn!(addr = %self.addr, error = %e, "connected but cannot bound writes, will retry");
                    return false;
                }
                info!(addr = %self.addr, "connected TCP stream");
                self.stream = Some(stream);
                true
            }
            Err(e) => {
                debug!(addr = %self.addr, error = %e, "no connection, will retry");
                false
            }
        }
    }

    /// Write one complete packet.
    ///
    /// A peer reset or broken pipe drops the connection and returns
    /// [`TransportError::Disconnected`]; any other failure is fatal.
    pub fn send(&mut self, packet: &[u8]) -> Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(TransportError::Disconnected);
        };

        match stream.write_all(packet) {
            Ok(()) => {
                trace!(addr = %self.addr, bytes = packet.len(), "sent TCP packet");
                Ok(())
            }
            Err(e) if crate::is_disconnect(&e) || e.kind() == ErrorKind::WriteZero => {
                warn!(addr = %self.addr, error = %e, "TCP peer went away");
                self.stream = None;
                Err(TransportError::Disconnected)
            }
            Err(e) => {
                error!(addr = %self.addr, error = %e, "TCP send failed");
                Err(TransportError::Io(e))
            }
        }
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Remote address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// Apply the egress socket options. Writes must stay bounded, so a
/// failure to set the write timeout is an error.
fn configure_stream(stream: &TcpStream, write_timeout: Duration) -> Result<()> {
    if let Err(source) = stream.set_nodelay(true) {
        warn!(error = %source, "could not set TCP_NODELAY, packets may be coalesced");
    }
    stream
        .set_write_timeout(Some(write_timeout.max(Duration::from_millis(1))))
        .map_err(|source| TransportError::SocketOption {
            option: "SO_SNDTIMEO",
            source,
        })
}

/// Ingress TCP listener that hands out one client stream at a time.
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    read_timeout: Duration,
}

impl TcpServer {
    /// Bind and listen on `addr`. Accepted streams get `read_timeout`.
    pub fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| {
            error!(addr = %addr, error = %source, "could not bind TCP port, port may be in use");
            TransportError::Bind { addr, source }
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        info!(local_addr = %local_addr, "listening for TCP client");

        Ok(Self {
            listener,
            local_addr,
            read_timeout: read_timeout.max(Duration::from_millis(1)),
        })
    }

    /// Wait up to the read timeout for a client.
    ///
    /// Returns `Ok(None)` when nobody connected in time. The returned stream
    /// is blocking with the configured read timeout applied.
    pub fn poll_accept(&self) -> Result<Option<TcpStream>> {
        let start = Instant::now();
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    stream.set_read_timeout(Some(self.read_timeout))?;
                    info!(peer = %peer, "accepted TCP client");
                    return Ok(Some(stream));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    let elapsed = start.elapsed();
                    if elapsed >= self.read_timeout {
                        return Ok(None);
                    }
                    std::thread::sleep(ACCEPT_POLL_INTERVAL.min(self.read_timeout - elapsed));
                }
                Err(e) => {
                    error!(error = %e, "could not accept incoming connection");
                    return Err(TransportError::Accept(e));
                }
            }
        }
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Read timeout applied to accepted streams.
    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn client_starts_disconnected_without_server() {
        let addr = {
            let probe = TcpListener::bind(loopback()).unwrap();
            probe.local_addr().unwrap()
        };
        let mut client = TcpClient::new(addr, Duration::from_millis(50));
        assert!(!client.is_connected());
        assert!(!client.ensure_connected());
        assert!(matches!(
            client.send(b"x").unwrap_err(),
            TransportError::Disconnected
        ));
    }

    #[test]
    fn accept_times_out_without_client() {
        let server = TcpServer::bind(loopback(), Duration::from_millis(20)).unwrap();
        let start = Instant::now();
        assert!(server.poll_accept().unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn client_reaches_server() {
        let server = TcpServer::bind(loopback(), Duration::from_secs(2)).unwrap();
        let mut client = TcpClient::new(server.local_addr(), Duration::from_secs(1));
        assert!(client.ensure_connected());

        let mut stream = server.poll_accept().unwrap().expect("client should be accepted");
        client.send(b"packet").unwrap();

        let mut buf = [0u8; 6];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"packet");
    }

    #[test]
    fn connected_stream_has_bounded_writes() {
        let server = TcpServer::bind(loopback(), Duration::from_secs(2)).unwrap();
        let client = TcpClient::new(server.local_addr(), Duration::from_secs(1));
        let stream = client.stream.as_ref().expect("client should connect");
        assert_eq!(stream.write_timeout().unwrap(), Some(DEFAULT_WRITE_TIMEOUT));
        assert!(stream.nodelay().unwrap());

        let client = client.with_write_timeout(Duration::ZERO);
        let stream = client.stream.as_ref().expect("still connected");
        // The kernel rounds to its tick, but zero must never mean "block forever".
        let bound = stream.write_timeout().unwrap().expect("write timeout set");
        assert!(bound > Duration::ZERO && bound < Duration::from_millis(50));
    }

    #[test]
    fn client_detects_peer_loss_and_reconnects() {
        let server = TcpServer::bind(loopback(), Duration::from_secs(2)).unwrap();
        let mut client = TcpClient::new(server.local_addr(), Duration::from_secs(1));
        let stream = server.poll_accept().unwrap().expect("client should be accepted");
        drop(stream);

        let mut lost = false;
        for _ in 0..100 {
            match client.send(&[0u8; 64]) {
                Ok(()) => std::thread::sleep(Duration::from_millis(10)),
                Err(TransportError::Disconnected) => {
                    lost = true;
                    break;
                }
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(lost, "peer loss should surface as Disconnected");
        assert!(!client.is_connected());

        assert!(client.ensure_connected());
        assert!(server.poll_accept().unwrap().is_some());
    }
}
