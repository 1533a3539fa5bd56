//! Seams between the framers and the sockets.
//!
//! A sink writes whole packets to a [`PacketOutput`]; a source pulls whole
//! units from a [`PacketInput`]. [`Egress`] and [`Ingress`] are the socket
//! backed implementations; tests substitute in-memory ones.

use std::net::{SocketAddr, TcpStream};

use bytes::Bytes;
use difi_frame::{check_packet_length, FrameConfig, FrameError, PacketReader};
use difi_transport::{TcpClient, TcpServer, TransportError, TransportKind, UdpReceiver, UdpSender};
use tracing::{debug, error, warn};

use crate::config::{SinkConfig, SourceConfig};
use crate::error::Result;

/// Where a sink sends encoded packets.
pub trait PacketOutput {
    /// Whether packets can be sent this step. A stream transport that has
    /// lost its peer reports `false` while it reconnects.
    fn ready(&mut self) -> Result<bool>;

    /// Send one complete packet.
    fn send(&mut self, packet: &[u8]) -> Result<()>;
}

/// Where a source receives packets from.
pub trait PacketInput {
    /// The next whole unit, or `None` when nothing arrived within the
    /// transport's timeout.
    fn next_unit(&mut self) -> Result<Option<Bytes>>;
}

/// Socket-backed packet output.
#[derive(Debug)]
pub enum Egress {
    Udp(UdpSender),
    Tcp(TcpClient),
}

impl Egress {
    /// Open the transport named by the sink configuration.
    pub fn open(config: &SinkConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Udp => Ok(Egress::Udp(UdpSender::connect(config.addr)?)),
            TransportKind::Tcp => Ok(Egress::Tcp(
                TcpClient::new(config.addr, config.connect_timeout())
                    .with_write_timeout(config.write_timeout()),
            )),
        }
    }
}

impl PacketOutput for Egress {
    fn ready(&mut self) -> Result<bool> {
        match self {
            Egress::Udp(_) => Ok(true),
            Egress::Tcp(client) => Ok(client.ensure_connected()),
        }
    }

    fn send(&mut self, packet: &[u8]) -> Result<()> {
        match self {
            Egress::Udp(sender) => Ok(sender.send(packet)?),
            Egress::Tcp(client) => {
                // The receiver re-frames on the word count, so it must be exact.
                check_packet_length(packet)?;
                match client.send(packet) {
                    Ok(()) => Ok(()),
                    Err(TransportError::Disconnected) => {
                        warn!(addr = %client.addr(), bytes = packet.len(), "dropped packet, TCP peer not connected");
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}

/// Socket-backed packet input.
#[derive(Debug)]
pub enum Ingress {
    Udp(UdpReceiver),
    Tcp(TcpIngress),
}

impl Ingress {
    /// Bind the transport named by the source configuration.
    pub fn bind(config: &SourceConfig) -> Result<Self> {
        match config.transport {
            TransportKind::Udp => Ok(Ingress::Udp(UdpReceiver::bind_with(
                config.addr,
                config.read_timeout(),
                config.datagram_size,
                config.recv_buffer_size,
            )?)),
            TransportKind::Tcp => {
                let server = TcpServer::bind(config.addr, config.read_timeout())?;
                let frame_config = FrameConfig {
                    max_packet_size: config.max_packet_size,
                    read_timeout: Some(config.read_timeout()),
                };
                Ok(Ingress::Tcp(TcpIngress {
                    server,
                    reader: None,
                    frame_config,
                }))
            }
        }
    }

    /// Address the socket is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        match self {
            Ingress::Udp(receiver) => receiver.local_addr(),
            Ingress::Tcp(tcp) => tcp.server.local_addr(),
        }
    }
}

impl PacketInput for Ingress {
    fn next_unit(&mut self) -> Result<Option<Bytes>> {
        match self {
            Ingress::Udp(receiver) => Ok(receiver.recv()?.map(Bytes::copy_from_slice)),
            Ingress::Tcp(tcp) => tcp.next_unit(),
        }
    }
}

/// Single-client TCP ingress with a re-framing reader.
#[derive(Debug)]
pub struct TcpIngress {
    server: TcpServer,
    reader: Option<PacketReader<TcpStream>>,
    frame_config: FrameConfig,
}

impl TcpIngress {
    /// Whether a client is currently attached.
    pub fn is_connected(&self) -> bool {
        self.reader.is_some()
    }

    fn next_unit(&mut self) -> Result<Option<Bytes>> {
        if self.reader.is_none() {
            let Some(stream) = self.server.poll_accept()? else {
                return Ok(None);
            };
            self.reader = Some(PacketReader::with_config_tcp(
                stream,
                self.frame_config.clone(),
            )?);
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        match reader.read_packet() {
            Ok(unit) => Ok(unit),
            Err(FrameError::ConnectionClosed) => {
                debug!(local_addr = %self.server.local_addr(), "TCP client gone, waiting for a new one");
                self.reader = None;
                Ok(None)
            }
            Err(e) => {
                error!(error = %e, "TCP stream cannot be re-framed");
                self.reader = None;
                Err(e.into())
            }
        }
    }
}
