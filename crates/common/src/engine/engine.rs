use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::{derive_key, digests_match, key_digest, Digest};
use crate::ring::RingBuffer;
use crate::transport::PeerAddress;

use super::clock::{Clock, SystemClock};
use super::config::{EngineConfig, MAX_CANDIDATES_PER_ROUND};
use super::error::{ArgumentError, ConfigError, EngineError};
use super::key::CandidateKey;
use super::part::{CandidateKeyPart, CandidateKeyPartIdentifier, IndexTuple, Round, RoundCounter};
use super::session::PeerSession;

/// Result of checking a peer against the admission criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriteriaOutcome {
    CanGenerateKey,
    NotYet,
    ShouldAbort,
}

/// Snapshot of the statistics kept for one peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeerStatistics {
    pub local_rounds: u32,
    pub matches: usize,
    pub match_fraction: f64,
    pub entropy_sum: f64,
}

/// Bookkeeping for candidate key parts, local and per peer
///
/// The engine holds the local candidate history, one [`PeerSession`] per
/// remote address, and the round counter. It never touches the network; the
/// orchestrator feeds it identifiers and acknowledgments and asks it for keys.
#[derive(Debug)]
pub struct CandidateKeyEngine<A: PeerAddress> {
    config: EngineConfig,
    rounds: RoundCounter,
    current_round: Option<Round>,
    history: RingBuffer<CandidateKeyPart>,
    sessions: HashMap<A, PeerSession>,
    clock: Arc<dyn Clock>,
}

impl<A: PeerAddress> CandidateKeyEngine<A> {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            history: RingBuffer::new(config.history_size),
            config,
            rounds: RoundCounter::default(),
            current_round: None,
            sessions: HashMap::new(),
            clock,
        })
    }

    /// Start numbering rounds at `first` instead of 1
    pub fn with_first_round(mut self, first: Round) -> Self {
        self.rounds = RoundCounter::starting_at(first);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The most recently issued round, if any
    pub fn current_round(&self) -> Option<Round> {
        self.current_round
    }

    /// Store a new round of candidate key parts
    ///
    /// Parts with identical content are collapsed before they are stored.
    /// Returns one identifier per unique part, in input order, numbered from
    /// zero within the new round.
    pub fn generate_candidates<P: AsRef<[u8]>>(
        &mut self,
        parts: &[P],
        entropy: f64,
    ) -> Result<Vec<CandidateKeyPartIdentifier>, ArgumentError> {
        if parts.is_empty() {
            return Err(ArgumentError::Empty);
        }
        if parts.len() > MAX_CANDIDATES_PER_ROUND {
            return Err(ArgumentError::TooMany {
                count: parts.len(),
                max: MAX_CANDIDATES_PER_ROUND,
            });
        }
        if parts.len() > self.history.capacity() {
            return Err(ArgumentError::ExceedsHistory {
                count: parts.len(),
                capacity: self.history.capacity(),
            });
        }
        if !entropy.is_finite() || entropy < 0.0 {
            return Err(ArgumentError::InvalidEntropy(entropy));
        }
        let expected = parts[0].as_ref().len();
        if expected == 0 {
            return Err(ArgumentError::EmptyPart);
        }
        if let Some((index, part)) = parts
            .iter()
            .enumerate()
            .find(|(_, p)| p.as_ref().len() != expected)
        {
            return Err(ArgumentError::UnequalLength {
                index,
                expected,
                found: part.as_ref().len(),
            });
        }

        let round = self.rounds.next_round();
        self.current_round = Some(round);
        for session in self.sessions.values_mut() {
            session.observe_round(round);
        }

        let mut seen = HashSet::new();
        let mut identifiers = Vec::with_capacity(parts.len());
        for raw in parts {
            let raw = raw.as_ref();
            if !seen.insert(raw) {
                continue;
            }
            // bounded by MAX_CANDIDATES_PER_ROUND
            let number = identifiers.len() as u8;
            let part = CandidateKeyPart::new(IndexTuple::new(round, number), raw, entropy);
            identifiers.push(part.identifier());
            self.history.push(part);
        }

        let duplicates = parts.len() - identifiers.len();
        if duplicates > 0 {
            tracing::info!(
                target: "ckp::statistics",
                round,
                duplicates,
                "collapsed duplicate candidate key parts"
            );
        }
        tracing::debug!(
            "generated {} candidate key parts for round {}",
            identifiers.len(),
            round
        );
        Ok(identifiers)
    }

    fn session_entry(&mut self, peer: &A) -> &mut PeerSession {
        let current_round = self.current_round;
        let capacity = self.config.matched_history_size;
        self.sessions.entry(peer.clone()).or_insert_with(|| {
            tracing::debug!("new candidate key session with {}", peer);
            PeerSession::new(current_round, capacity)
        })
    }

    /// Match identifiers advertised by `peer` against the local history
    ///
    /// Identifiers are tried in order against the history oldest first; the
    /// first hit is promoted and its position in `identifiers` returned.
    pub fn match_candidates(
        &mut self,
        peer: &A,
        identifiers: &[CandidateKeyPartIdentifier],
    ) -> Option<usize> {
        let now = self.clock.now();
        let strict = self.config.strict_digest_length;
        let max_age = self.config.max_match_age();
        self.session_entry(peer).prune(now, max_age);

        for (position, identifier) in identifiers.iter().enumerate() {
            let found = self.history.find(|part| {
                digests_match(
                    part.digest.as_bytes(),
                    identifier.digest.as_bytes(),
                    strict,
                )
            });
            if let Some(part) = found {
                let part = part.clone();
                tracing::debug!(
                    "identifier {} from {} matches local part {}",
                    identifier.index(),
                    peer,
                    part.index
                );
                self.session_entry(peer)
                    .promote(&part, Some(identifier.index()), now);
                return Some(position);
            }
        }
        None
    }

    /// Promote one of our own parts that `peer` reported as matching
    ///
    /// Returns false if the part is no longer in the local history.
    pub fn acknowledge_matches(&mut self, peer: &A, round: Round, number: u8) -> bool {
        let index = IndexTuple::new(round, number);
        let Some(part) = self.history.find(|p| p.index == index).cloned() else {
            tracing::debug!(
                "{} acknowledged part {} which is no longer in the local history",
                peer,
                index
            );
            return false;
        };
        let now = self.clock.now();
        let max_age = self.config.max_match_age();
        let session = self.session_entry(peer);
        session.prune(now, max_age);
        session.promote(&part, None, now);
        true
    }

    /// Evaluate the admission criteria for `peer`
    pub fn check_criteria(&self, peer: &A) -> CriteriaOutcome {
        let Some(stats) = self.statistics(peer) else {
            return CriteriaOutcome::NotYet;
        };
        let config = &self.config;
        if stats.local_rounds < config.min_num_rounds_for_action {
            CriteriaOutcome::NotYet
        } else if stats.match_fraction >= config.min_matching_rounds_fraction
            && stats.entropy_sum >= config.min_matching_entropy
        {
            CriteriaOutcome::CanGenerateKey
        } else if 1.0 - stats.match_fraction >= config.max_mismatch_rounds_fraction {
            CriteriaOutcome::ShouldAbort
        } else {
            CriteriaOutcome::NotYet
        }
    }

    /// Assemble a key from the parts matched with `peer`
    ///
    /// Walks the matched buffer oldest first and takes the first part seen
    /// for each round.
    pub fn generate_key(&mut self, peer: &A) -> Result<CandidateKey, EngineError> {
        let now = self.clock.now();
        let max_age = self.config.max_match_age();
        let session = self
            .sessions
            .get_mut(peer)
            .ok_or_else(|| EngineError::UnknownPeer(peer.to_string()))?;
        session.prune(now, max_age);

        let mut rounds = HashSet::new();
        let mut concatenated = Zeroizing::new(Vec::new());
        let mut local_indices = Vec::new();
        let mut remote_indices = Vec::new();
        for matched in session.matched.iter() {
            if !rounds.insert(matched.part.index.round) {
                continue;
            }
            concatenated.extend_from_slice(&matched.part.raw);
            local_indices.push(matched.part.index);
            remote_indices.push(matched.remote);
        }
        if local_indices.is_empty() {
            return Err(EngineError::NoMatchedParts(peer.to_string()));
        }

        let key = derive_key(&concatenated);
        let digest = key_digest(&key);
        tracing::debug!(
            "generated candidate key {} from {} parts for {}",
            digest,
            local_indices.len(),
            peer
        );
        Ok(CandidateKey {
            key,
            digest,
            local_indices,
            remote_indices,
        })
    }

    /// Rebuild the key a peer proposed from the index tuples it sent
    ///
    /// `local_indices` are our own numbering as far as the peer knows it;
    /// `remote_indices` are the peer's numbering and always present. Each slot
    /// is resolved by our index in the matched buffer, then by the peer's
    /// index in the matched buffer, then by our index in the local history.
    /// Parts found only in the history are promoted once the digest verifies.
    pub fn search_key(
        &mut self,
        peer: &A,
        digest: &Digest,
        local_indices: &[Option<IndexTuple>],
        remote_indices: &[IndexTuple],
    ) -> Option<CandidateKey> {
        if local_indices.is_empty() || local_indices.len() != remote_indices.len() {
            tracing::warn!(
                "key proposal from {} has inconsistent index lists ({} vs {})",
                peer,
                local_indices.len(),
                remote_indices.len()
            );
            return None;
        }
        let now = self.clock.now();
        let max_age = self.config.max_match_age();
        let strict = self.config.strict_digest_length;
        let session = self.sessions.get_mut(peer)?;
        session.prune(now, max_age);

        let mut parts = Vec::with_capacity(local_indices.len());
        let mut from_history = Vec::new();
        for (local, remote) in local_indices.iter().zip(remote_indices) {
            let matched = local
                .and_then(|index| session.matched.find(|m| m.part.index == index))
                .or_else(|| session.matched.find(|m| m.remote == Some(*remote)));
            if let Some(matched) = matched {
                parts.push(matched.part.clone());
                continue;
            }
            let Some(part) = local.and_then(|index| self.history.find(|p| p.index == index))
            else {
                tracing::debug!(
                    "part {} of key {} from {} is unknown here",
                    remote,
                    digest,
                    peer
                );
                return None;
            };
            from_history.push((part.clone(), *remote));
            parts.push(part.clone());
        }

        let mut concatenated = Zeroizing::new(Vec::new());
        for part in &parts {
            concatenated.extend_from_slice(&part.raw);
        }
        let key = derive_key(&concatenated);
        let computed = key_digest(&key);
        if !digests_match(computed.as_bytes(), digest.as_bytes(), strict) {
            tracing::debug!(
                "reconstructed key {} does not match proposal {} from {}",
                computed,
                digest,
                peer
            );
            return None;
        }

        for (part, remote) in &from_history {
            session.promote(part, Some(*remote), now);
        }
        Some(CandidateKey {
            key,
            digest: computed,
            local_indices: parts.iter().map(|p| p.index).collect(),
            remote_indices: remote_indices.iter().copied().map(Some).collect(),
        })
    }

    pub fn has_session(&self, peer: &A) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &A> + '_ {
        self.sessions.keys()
    }

    pub fn statistics(&self, peer: &A) -> Option<PeerStatistics> {
        let session = self.sessions.get(peer)?;
        Some(PeerStatistics {
            local_rounds: session.local_rounds(self.current_round),
            matches: session.num_matches(),
            match_fraction: session.match_fraction(self.current_round),
            entropy_sum: session.entropy_sum(),
        })
    }

    pub fn local_rounds(&self, peer: &A) -> u32 {
        self.statistics(peer).map_or(0, |s| s.local_rounds)
    }

    pub fn match_fraction(&self, peer: &A) -> f64 {
        self.statistics(peer).map_or(0.0, |s| s.match_fraction)
    }

    pub fn entropy_sum(&self, peer: &A) -> f64 {
        self.statistics(peer).map_or(0.0, |s| s.entropy_sum)
    }

    /// Number of distinct parts ever promoted for `peer`
    pub fn num_promoted(&self, peer: &A) -> usize {
        self.sessions.get(peer).map_or(0, PeerSession::num_promoted)
    }

    /// Drop everything known about `peer`; returns whether there was state
    pub fn wipe(&mut self, peer: &A) -> bool {
        self.sessions.remove(peer).is_some()
    }

    /// Drop all peer sessions and the local history
    pub fn wipe_all(&mut self) {
        self.sessions.clear();
        self.history.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn engine() -> CandidateKeyEngine<&'static str> {
        CandidateKeyEngine::new(EngineConfig {
            history_size: 8,
            min_num_rounds_for_action: 1,
            min_matching_rounds_fraction: 0.5,
            max_mismatch_rounds_fraction: 0.5,
            min_matching_entropy: 1.0,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_generate_rejects_bad_batches() {
        let mut engine = engine();
        let empty: [&[u8]; 0] = [];
        assert_eq!(
            engine.generate_candidates(&empty, 1.0),
            Err(ArgumentError::Empty)
        );
        assert_eq!(
            engine.generate_candidates(&[&b"ab"[..], &b"abc"[..]], 1.0),
            Err(ArgumentError::UnequalLength {
                index: 1,
                expected: 2,
                found: 3
            })
        );
        let too_many = vec![vec![0u8; 4]; 9];
        assert!(matches!(
            engine.generate_candidates(&too_many, 1.0),
            Err(ArgumentError::ExceedsHistory { .. })
        ));
        assert!(matches!(
            engine.generate_candidates(&[b"ab"], f64::NAN),
            Err(ArgumentError::InvalidEntropy(_))
        ));
        assert_eq!(
            engine.generate_candidates(&[b""], 1.0),
            Err(ArgumentError::EmptyPart)
        );
        // nothing was stored by the rejected calls
        assert_eq!(engine.current_round(), None);
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let mut engine = engine();
        let ids = engine
            .generate_candidates(&[b"aa", b"bb", b"aa", b"cc"], 1.0)
            .unwrap();
        assert_eq!(ids.len(), 3);
        let numbers: Vec<u8> = ids.iter().map(|id| id.number).collect();
        assert_eq!(numbers, vec![0, 1, 2]);
        assert_eq!(ids[2].digest, crate::crypto::part_digest(b"cc"));
    }

    #[test]
    fn test_generate_key_takes_one_part_per_round() {
        let mut engine = engine();
        let ids = engine.generate_candidates(&[b"aa", b"bb"], 1.0).unwrap();
        engine.match_candidates(&"peer", &ids[..1]);
        engine.match_candidates(&"peer", &ids[1..]);
        let key = engine.generate_key(&"peer").unwrap();
        assert_eq!(key.num_parts(), 1);
        assert_eq!(key.local_indices(), &[ids[0].index()]);
    }

    #[test]
    fn test_generate_key_without_matches() {
        let mut engine = engine();
        assert_eq!(
            engine.generate_key(&"nobody").unwrap_err(),
            EngineError::UnknownPeer("nobody".to_string())
        );
        engine.generate_candidates(&[b"aa"], 1.0).unwrap();
        engine.match_candidates(&"peer", &[]);
        assert!(matches!(
            engine.generate_key(&"peer"),
            Err(EngineError::NoMatchedParts(_))
        ));
    }

    #[test]
    fn test_acknowledge_unknown_part_is_a_no_op() {
        let mut engine = engine();
        engine.generate_candidates(&[b"aa"], 1.0).unwrap();
        assert!(!engine.acknowledge_matches(&"peer", 99, 0));
        assert!(!engine.has_session(&"peer"));
        assert!(engine.acknowledge_matches(&"peer", 1, 0));
        assert_eq!(engine.entropy_sum(&"peer"), 1.0);
    }

    #[test]
    fn test_wipe() {
        let mut engine = engine();
        let ids = engine.generate_candidates(&[b"aa"], 1.0).unwrap();
        engine.match_candidates(&"peer", &ids);
        assert!(engine.wipe(&"peer"));
        assert!(!engine.wipe(&"peer"));
        assert_eq!(engine.match_fraction(&"peer"), 0.0);
    }
}
