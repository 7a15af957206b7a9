/// Lightweight harness for multi-peer protocol tests
///
/// Peers run in-process and exchange datagrams through a [`SimNetwork`] that
/// never delivers anything on its own: tests pick which datagram arrives
/// next, drop or duplicate datagrams, and step a shared [`ManualClock`].
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::TestNetwork;
///
/// let mut net = TestNetwork::new();
/// net.add_peer("alice", config.clone())?;
/// net.add_peer("bob", config)?;
///
/// net.peer("alice").unwrap().submit(&[b"shared"], 4.0)?;
/// net.peer("bob").unwrap().submit(&[b"shared"], 4.0)?;
///
/// // deliver everything in flight, in send order
/// net.run_until_quiet(100)?;
/// ```
mod clock;
mod network;
mod peer;

pub use clock::ManualClock;
pub use network::{Datagram, SimAddress, SimNetwork, SimTransport, TestNetwork};
pub use peer::TestPeer;
