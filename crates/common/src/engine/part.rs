use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use crate::crypto::{part_digest, Digest, SecretBytes};

/// Opaque round number, local to one engine instance
///
/// Rounds wrap silently; ordering uses serial-number arithmetic (see
/// [`round_precedes`]), so the counter is safe across the wrap as long as
/// live rounds stay within half the number space of each other.
pub type Round = u32;

/// Whether `a` was issued before `b`, taking wrap-around into account
pub fn round_precedes(a: Round, b: Round) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

/// Per-instance round counter
#[derive(Debug, Clone)]
pub struct RoundCounter {
    next: Round,
}

impl RoundCounter {
    pub fn starting_at(first: Round) -> Self {
        Self { next: first }
    }

    pub fn next_round(&mut self) -> Round {
        let round = self.next;
        self.next = self.next.wrapping_add(1);
        round
    }
}

impl Default for RoundCounter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

/// A `(round, candidateNumber)` pair naming one candidate key part
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexTuple {
    pub round: Round,
    pub number: u8,
}

impl IndexTuple {
    pub fn new(round: Round, number: u8) -> Self {
        Self { round, number }
    }
}

impl fmt::Display for IndexTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid index tuple '{0}'")]
pub struct IndexTupleParseError(pub String);

impl FromStr for IndexTuple {
    type Err = IndexTupleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || IndexTupleParseError(s.to_string());
        let (round, number) = s.split_once('.').ok_or_else(err)?;
        Ok(Self {
            round: round.parse().map_err(|_| err())?,
            number: number.parse().map_err(|_| err())?,
        })
    }
}

/// A locally generated candidate key part; never leaves this host
#[derive(Debug, Clone)]
pub struct CandidateKeyPart {
    pub(crate) index: IndexTuple,
    pub(crate) raw: SecretBytes,
    pub(crate) digest: Digest,
    pub(crate) entropy: f64,
}

impl CandidateKeyPart {
    pub(crate) fn new(index: IndexTuple, raw: &[u8], entropy: f64) -> Self {
        Self {
            index,
            raw: SecretBytes::from(raw),
            digest: part_digest(raw),
            entropy,
        }
    }

    pub fn index(&self) -> IndexTuple {
        self.index
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn entropy(&self) -> f64 {
        self.entropy
    }

    pub fn identifier(&self) -> CandidateKeyPartIdentifier {
        CandidateKeyPartIdentifier {
            round: self.index.round,
            number: self.index.number,
            digest: self.digest.clone(),
        }
    }
}

/// The public view of a candidate key part, as advertised on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateKeyPartIdentifier {
    pub round: Round,
    pub number: u8,
    pub digest: Digest,
}

impl CandidateKeyPartIdentifier {
    pub fn index(&self) -> IndexTuple {
        IndexTuple::new(self.round, self.number)
    }
}

/// A local part promoted into a peer's matched buffer
#[derive(Debug, Clone)]
pub(crate) struct MatchedKeyPart {
    pub(crate) part: CandidateKeyPart,
    /// How the peer numbers the same part, when we have seen its identifier
    pub(crate) remote: Option<IndexTuple>,
    pub(crate) matched_at: Instant,
}
