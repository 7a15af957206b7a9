/**
 * Hashing, key derivation and secret containers.
 *  Everything that touches raw key material
 *  zeroizes it when dropped.
 */
pub mod crypto;
/**
 * Candidate key engine: local candidate history,
 *  per-peer matched parts, admission criteria and
 *  index-addressed key reconstruction.
 */
pub mod engine;
/**
 * Wire codec and the message-driven orchestrator
 *  that runs the protocol over an unreliable
 *  datagram transport.
 */
pub mod protocol;
/**
 * Fixed-capacity ring buffer used for every
 *  bounded history in the crate.
 */
pub mod ring;
/**
 * In-process harness for driving several protocol
 *  instances over a simulated lossy network.
 */
pub mod testkit;
/**
 * The seam between the orchestrator and whatever
 *  carries its datagrams.
 */
pub mod transport;

pub mod prelude {
    pub use crate::crypto::{Digest, SharedKey};
    pub use crate::engine::{
        CandidateKeyEngine, CandidateKeyPartIdentifier, CriteriaOutcome, EngineConfig, IndexTuple,
        Round,
    };
    pub use crate::protocol::{
        CandidateKeyProtocol, EventChannel, FailureCause, ProtocolConfig, ProtocolError,
        ProtocolEvent, ProtocolEventHandler,
    };
    pub use crate::transport::{DatagramTransport, PeerAddress};
}
