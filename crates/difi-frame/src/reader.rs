use std::io::{ErrorKind, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::codec::{split_packet, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 16 * 1024;
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Reads complete packets from any `Read` byte stream.
///
/// Handles partial reads internally, so callers always get whole packets.
/// When a read timeout is configured, bytes of a packet that has not fully
/// arrived stay buffered for the next call.
#[derive(Debug)]
pub struct PacketReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> PacketReader<T> {
    /// Create a new packet reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete packet.
    ///
    /// Returns `Ok(None)` when the configured read timeout elapses first.
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF or a peer reset;
    /// any partial packet is discarded.
    pub fn read_packet(&mut self) -> Result<Option<Bytes>> {
        let deadline = self.config.read_timeout.map(|t| Instant::now() + t);

        loop {
            match split_packet(&mut self.buf, self.config.max_packet_size) {
                Ok(Some(packet)) => {
                    trace!(bytes = packet.len(), buffered = self.buf.len(), "re-framed packet");
                    return Ok(Some(packet));
                }
                Ok(None) => {}
                Err(err) => {
                    // The stream is out of step; nothing buffered can be trusted.
                    self.buf.clear();
                    return Err(err);
                }
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if difi_transport::is_timeout(&err) && deadline.is_some() => {
                    return Ok(None);
                }
                Err(err) if difi_transport::is_disconnect(&err) => {
                    debug!(error = %err, discarded = self.buf.len(), "stream peer went away");
                    self.buf.clear();
                    return Err(FrameError::ConnectionClosed);
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                debug!(discarded = self.buf.len(), "stream closed by peer");
                self.buf.clear();
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Bytes held for a packet that has not fully arrived.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

impl PacketReader<TcpStream> {
    /// Create a packet reader for a TCP stream and apply the read timeout
    /// from config to the socket.
    pub fn with_config_tcp(inner: TcpStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout.map(|t| t.max(Duration::from_millis(1))))?;
        Ok(Self::with_config(inner, config))
    }
}
