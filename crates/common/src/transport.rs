use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::io;

/// Anything that can name a remote peer
///
/// The daemon uses `SocketAddr`; the test kit uses plain names.
pub trait PeerAddress: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> PeerAddress for T where T: Clone + Eq + Hash + Debug + Display + Send + Sync + 'static {}

/// Best-effort datagram delivery
///
/// Sends must not block on the network: the orchestrator calls them after
/// releasing its lock and only logs failures. Delivery, ordering and
/// uniqueness are not expected.
pub trait DatagramTransport<A>: Send + Sync {
    /// Unicast a datagram to one peer
    fn send_to(&self, peer: &A, datagram: &[u8]) -> io::Result<()>;

    /// Send a datagram to every peer in the group
    fn multicast(&self, datagram: &[u8]) -> io::Result<()>;
}
