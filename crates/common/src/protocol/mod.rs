//! Candidate key protocol over an unreliable datagram transport
//!
//! # Message flow
//!
//! 1. Each local round is advertised as `CAND` identifiers
//! 2. A receiver that matches one of them promotes the part and may answer
//!    `MATCH`, so the advertiser promotes it too
//! 3. Once the admission criteria hold, a side assembles a key and sends
//!    `KEY` with the digest and index tuples of the parts used
//! 4. The peer reconstructs the key from those indices. On success it keeps
//!    it as its tentative key (stage 1) and answers `ACK` with the digest
//! 5. An `ACK` for a key we proposed finalizes the session (stage 2)
//!
//! # Reconciliation
//!
//! Both sides may propose different keys from the same matched material at
//! nearly the same time. Stage 2 resolves this deterministically:
//!
//! - no tentative key pending: the acknowledged key is final, and an `ACK`
//!   for it is echoed so the peer, which holds it as tentative, finalizes too
//! - tentative key equal to the acknowledged one: that key is final
//! - tentative key different: the XOR of both keys is final; XOR commutes,
//!   so both sides compute the same value
//!
//! A tentative key is not replaced by a differing proposal until the
//! configured number of replacement attempts has been ignored.
//!
//! `NACK` ends a session immediately. Malformed datagrams, acknowledgments
//! for unknown keys and too many rounds without a match all end the session
//! with a `NACK` to the peer.

mod config;
mod error;
mod events;
mod message;
mod orchestrator;
mod state;
mod stats;

pub use config::ProtocolConfig;
pub use error::{DecodeError, FailureCause, ProtocolError};
pub use events::{
    EventChannel, EventReceiver, ProtocolEvent, ProtocolEventHandler, PROGRESS_STAGES,
    STAGE_KEY_PROPOSED, STAGE_KEY_TENTATIVE, STAGE_PART_MATCHED,
};
pub use message::{
    encode_candidates, KeyProposal, Message, MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE,
};
pub use orchestrator::CandidateKeyProtocol;
pub use stats::ProtocolStats;
