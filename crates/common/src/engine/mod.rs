//! Candidate key engine
//!
//! Each round the local producer hands over a batch of equal-length byte
//! vectors derived from sensor data. The engine stores them as candidate key
//! parts and returns public identifiers (round, number and digest) to
//! advertise. Incoming identifiers from a peer are matched against the local
//! history; matches are promoted into that peer's session, whose statistics
//! decide when enough shared material exists to assemble a key.
//!
//! # Admission criteria
//!
//! With `r` local rounds observed for a peer, `f` the fraction of those
//! rounds containing a match and `e` the summed entropy of matched parts:
//!
//! - `r < min_num_rounds_for_action`: not yet
//! - `f >= min_matching_rounds_fraction && e >= min_matching_entropy`: generate
//! - `1 - f >= max_mismatch_rounds_fraction`: abort
//! - otherwise: not yet
//!
//! # Key reconstruction
//!
//! A proposed key carries index tuples for both sides, so the receiver looks
//! up the exact parts instead of searching combinations of candidates.

mod clock;
mod config;
#[allow(clippy::module_inception)]
mod engine;
mod error;
mod key;
mod part;
mod session;

pub use clock::{Clock, SystemClock};
pub use config::{EngineConfig, MAX_CANDIDATES_PER_ROUND};
pub use engine::{CandidateKeyEngine, CriteriaOutcome, PeerStatistics};
pub use error::{ArgumentError, ConfigError, EngineError};
pub use key::CandidateKey;
pub use part::{
    round_precedes, CandidateKeyPart, CandidateKeyPartIdentifier, IndexTuple,
    IndexTupleParseError, Round, RoundCounter,
};
