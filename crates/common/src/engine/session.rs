use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::ring::RingBuffer;

use super::part::{round_precedes, CandidateKeyPart, IndexTuple, MatchedKeyPart, Round};

/// Matching state the engine keeps for one remote peer
///
/// Statistics are cumulative for the lifetime of the session. Pruning by age
/// only drops key material from `matched`; counted rounds and entropy stay.
#[derive(Debug)]
pub(crate) struct PeerSession {
    /// Oldest local round that counts towards this peer, unset until the
    /// engine has produced a round
    first_round: Option<Round>,
    matched_rounds: HashSet<Round>,
    promoted: HashSet<IndexTuple>,
    entropy_sum: f64,
    pub(crate) matched: RingBuffer<MatchedKeyPart>,
}

impl PeerSession {
    pub(crate) fn new(current_round: Option<Round>, matched_capacity: usize) -> Self {
        Self {
            first_round: current_round,
            matched_rounds: HashSet::new(),
            promoted: HashSet::new(),
            entropy_sum: 0.0,
            matched: RingBuffer::new(matched_capacity),
        }
    }

    /// Called for every new local round
    pub(crate) fn observe_round(&mut self, round: Round) {
        if self.first_round.is_none() {
            self.first_round = Some(round);
        }
    }

    pub(crate) fn local_rounds(&self, current_round: Option<Round>) -> u32 {
        match (self.first_round, current_round) {
            (Some(first), Some(current)) => current.wrapping_sub(first).saturating_add(1),
            _ => 0,
        }
    }

    pub(crate) fn num_matches(&self) -> usize {
        self.matched_rounds.len()
    }

    pub(crate) fn match_fraction(&self, current_round: Option<Round>) -> f64 {
        self.num_matches() as f64 / self.local_rounds(current_round).max(1) as f64
    }

    pub(crate) fn entropy_sum(&self) -> f64 {
        self.entropy_sum
    }

    pub(crate) fn num_promoted(&self) -> usize {
        self.promoted.len()
    }

    /// Promote a local part, at most once per `(round, number)`
    ///
    /// Returns true if the part was newly promoted. A repeated promotion only
    /// fills in the peer's index if it was not known yet.
    pub(crate) fn promote(
        &mut self,
        part: &CandidateKeyPart,
        remote: Option<IndexTuple>,
        now: Instant,
    ) -> bool {
        if let Some(existing) = self.matched.find_mut(|m| m.part.index == part.index) {
            if existing.remote.is_none() {
                existing.remote = remote;
            }
            return false;
        }
        if !self.promoted.insert(part.index) {
            // promoted before and since evicted or pruned
            return false;
        }

        let round = part.index.round;
        self.matched_rounds.insert(round);
        self.entropy_sum += part.entropy;
        match self.first_round {
            Some(first) if round_precedes(round, first) => self.first_round = Some(round),
            None => self.first_round = Some(round),
            _ => {}
        }

        self.matched.push(MatchedKeyPart {
            part: part.clone(),
            remote,
            matched_at: now,
        });
        true
    }

    pub(crate) fn prune(&mut self, now: Instant, max_age: Duration) {
        let before = self.matched.len();
        self.matched
            .retain(|m| now.saturating_duration_since(m.matched_at) <= max_age);
        let pruned = before - self.matched.len();
        if pruned > 0 {
            tracing::debug!("pruned {} matched parts older than {:?}", pruned, max_age);
        }
    }
}
