//! UDP carrier for the protocol
//!
//! Candidate advertisements go to the configured group address, which is a
//! multicast group in normal operation. Pointing it at a plain unicast
//! address pairs exactly two hosts without multicast routing. Everything
//! else is unicast back to the address a datagram came from.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::watch;

use common::protocol::{CandidateKeyProtocol, MAX_DATAGRAM_SIZE};
use common::transport::DatagramTransport;

use crate::config::NetworkConfig;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("only IPv4 multicast groups are supported, got {0}")]
    UnsupportedGroup(SocketAddr),
}

#[derive(Debug)]
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    group: SocketAddr,
}

impl UdpTransport {
    pub async fn bind(config: &NetworkConfig) -> Result<Self, TransportError> {
        let socket = UdpSocket::bind(config.listen_addr).await?;
        Self::from_socket(socket, config.group_addr, config.interface)
    }

    /// Wrap an already bound socket, joining `group` if it is multicast
    pub fn from_socket(
        socket: UdpSocket,
        group: SocketAddr,
        interface: Ipv4Addr,
    ) -> Result<Self, TransportError> {
        match group.ip() {
            IpAddr::V4(ip) if ip.is_multicast() => {
                socket.join_multicast_v4(ip, interface)?;
                // our own advertisements are of no use to us
                socket.set_multicast_loop_v4(false)?;
                tracing::info!("joined multicast group {} on {}", ip, interface);
            }
            IpAddr::V6(ip) if ip.is_multicast() => {
                return Err(TransportError::UnsupportedGroup(group));
            }
            _ => tracing::info!("advertising candidates to unicast peer {}", group),
        }
        Ok(Self {
            socket: Arc::new(socket),
            group,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn socket(&self) -> Arc<UdpSocket> {
        self.socket.clone()
    }
}

impl DatagramTransport<SocketAddr> for UdpTransport {
    fn send_to(&self, peer: &SocketAddr, datagram: &[u8]) -> io::Result<()> {
        // a full send buffer is just another lost datagram
        self.socket.try_send_to(datagram, *peer).map(|_| ())
    }

    fn multicast(&self, datagram: &[u8]) -> io::Result<()> {
        self.socket.try_send_to(datagram, self.group).map(|_| ())
    }
}

/// Feed every datagram received on `socket` into `protocol` until shutdown
pub async fn receive_loop(
    socket: Arc<UdpSocket>,
    protocol: CandidateKeyProtocol<SocketAddr>,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), TransportError> {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1];
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!("receive loop shutting down");
                return Ok(());
            }
            received = socket.recv_from(&mut buf) => {
                let (len, sender) = match received {
                    Ok(received) => received,
                    // ICMP port unreachable from a vanished peer surfaces here
                    Err(err) if err.kind() == io::ErrorKind::ConnectionReset => {
                        tracing::debug!("ignoring receive error: {}", err);
                        continue;
                    }
                    Err(err) => return Err(err.into()),
                };
                if let Err(err) = protocol.handle_datagram(&sender, &buf[..len]) {
                    tracing::error!("handling datagram from {} failed: {}", sender, err);
                }
            }
        }
    }
}
