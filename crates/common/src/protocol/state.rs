//! The serialized protocol state machine
//!
//! Everything here runs under the orchestrator's lock. Nothing is sent and no
//! handler is called from inside; the state only records [`Effect`]s, which
//! the orchestrator flushes once the lock is released.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crypto::{digests_match, Digest, SharedKey};
use crate::engine::{
    CandidateKey, CandidateKeyEngine, CandidateKeyPartIdentifier, Clock, CriteriaOutcome,
};
use crate::ring::RingBuffer;
use crate::transport::PeerAddress;

use super::config::ProtocolConfig;
use super::error::{FailureCause, ProtocolError};
use super::events::{
    ProtocolEvent, PROGRESS_STAGES, STAGE_KEY_PROPOSED, STAGE_KEY_TENTATIVE, STAGE_PART_MATCHED,
};
use super::message::{encode_candidates, KeyProposal, Message};
use super::stats::ProtocolStats;

pub(crate) enum Effect<A> {
    Send { to: A, datagram: Vec<u8> },
    Multicast { datagram: Vec<u8> },
    Event(ProtocolEvent<A>),
}

/// Key confirmation state for one peer
#[derive(Debug)]
struct KeyHandshake {
    recent_keys: RingBuffer<CandidateKey>,
    /// Stage 1: a key reconstructed from the peer's proposal and acknowledged
    tentative: Option<CandidateKey>,
    overwrite_blocked: u32,
}

impl KeyHandshake {
    fn new(recent_keys_size: usize) -> Self {
        Self {
            recent_keys: RingBuffer::new(recent_keys_size),
            tentative: None,
            overwrite_blocked: 0,
        }
    }
}

/// CAND message kept for matching against later local rounds
#[derive(Debug)]
struct BufferedCandidates<A> {
    sender: A,
    identifiers: Vec<CandidateKeyPartIdentifier>,
}

/// KEY message that could not be resolved yet
#[derive(Debug)]
struct BufferedProposal<A> {
    sender: A,
    proposal: KeyProposal,
}

pub(crate) struct ProtocolState<A: PeerAddress> {
    config: ProtocolConfig,
    engine: CandidateKeyEngine<A>,
    handshakes: HashMap<A, KeyHandshake>,
    candidate_replay: RingBuffer<BufferedCandidates<A>>,
    proposal_replay: RingBuffer<BufferedProposal<A>>,
    stats: ProtocolStats,
    effects: Vec<Effect<A>>,
}

impl<A: PeerAddress> ProtocolState<A> {
    pub(crate) fn new(config: ProtocolConfig, clock: Arc<dyn Clock>) -> Result<Self, ProtocolError> {
        config.validate()?;
        let engine = CandidateKeyEngine::with_clock(config.engine.clone(), clock)?;
        Ok(Self {
            candidate_replay: RingBuffer::new(config.replay_buffer_size),
            proposal_replay: RingBuffer::new(config.replay_buffer_size),
            config,
            engine,
            handshakes: HashMap::new(),
            stats: ProtocolStats::default(),
            effects: Vec::new(),
        })
    }

    pub(crate) fn engine(&self) -> &CandidateKeyEngine<A> {
        &self.engine
    }

    pub(crate) fn stats(&self) -> ProtocolStats {
        self.stats
    }

    pub(crate) fn take_effects(&mut self) -> Vec<Effect<A>> {
        std::mem::take(&mut self.effects)
    }

    fn has_state(&self, peer: &A) -> bool {
        self.engine.has_session(peer) || self.handshakes.contains_key(peer)
    }

    fn send(&mut self, to: &A, message: Message) {
        let datagram = message.encode();
        tracing::trace!("-> {} {}", to, message.kind());
        self.stats.record_sent(datagram.len());
        self.effects.push(Effect::Send {
            to: to.clone(),
            datagram,
        });
    }

    fn progress(&mut self, peer: &A, stage: u32, message: String) {
        self.effects.push(Effect::Event(ProtocolEvent::Progress {
            peer: peer.clone(),
            stage,
            total: PROGRESS_STAGES,
            message,
        }));
    }

    /// Store a new local round, advertise it and re-examine buffered traffic
    pub(crate) fn submit<P: AsRef<[u8]>>(
        &mut self,
        parts: &[P],
        entropy: f64,
    ) -> Result<Vec<CandidateKeyPartIdentifier>, ProtocolError> {
        let identifiers = self.engine.generate_candidates(parts, entropy)?;
        self.stats.candidate_rounds += 1;

        if self.config.broadcast_candidates {
            let datagrams = encode_candidates(&identifiers, self.config.max_datagram_size)?;
            tracing::debug!(
                "broadcasting {} candidate identifiers in {} datagrams",
                identifiers.len(),
                datagrams.len()
            );
            for datagram in datagrams {
                self.stats.record_sent(datagram.len());
                self.effects.push(Effect::Multicast { datagram });
            }
        }

        self.replay_candidates()?;
        let peers: Vec<A> = self.engine.peers().cloned().collect();
        for peer in &peers {
            self.check_key_generation(peer);
        }
        self.replay_proposals()?;
        Ok(identifiers)
    }

    /// Process one datagram received from `sender`
    pub(crate) fn handle(&mut self, sender: &A, datagram: &[u8]) -> Result<(), ProtocolError> {
        self.stats.record_received(datagram.len());
        let message = match Message::decode(datagram) {
            Ok(message) => message,
            Err(err) => {
                tracing::warn!("dropping malformed datagram from {}: {}", sender, err);
                self.fail(sender, FailureCause::Decode(err), None, true);
                return Ok(());
            }
        };
        tracing::trace!("<- {} {}", sender, message.kind());

        match message {
            Message::Candidates { identifiers, .. } => self.on_candidates(sender, identifiers),
            Message::Match { round, number } => self.on_match(sender, round, number),
            Message::Key(proposal) => self.on_key_proposal(sender, proposal),
            Message::Ack { digest } => self.on_ack(sender, &digest),
            Message::Nack => {
                self.on_nack(sender);
                Ok(())
            }
        }
    }

    fn on_candidates(
        &mut self,
        sender: &A,
        identifiers: Vec<CandidateKeyPartIdentifier>,
    ) -> Result<(), ProtocolError> {
        if identifiers.is_empty() {
            tracing::warn!("ignoring CAND message without identifiers from {}", sender);
            return Ok(());
        }
        match self.engine.match_candidates(sender, &identifiers) {
            Some(position) => self.on_matching_part(sender, &identifiers[position])?,
            None => {
                tracing::debug!(
                    "none of {} identifiers from {} match",
                    identifiers.len(),
                    sender
                );
                if self.engine.check_criteria(sender) == CriteriaOutcome::ShouldAbort {
                    self.abort(sender);
                }
            }
        }
        if self.engine.has_session(sender) {
            self.candidate_replay.push(BufferedCandidates {
                sender: sender.clone(),
                identifiers,
            });
        }
        Ok(())
    }

    fn on_matching_part(
        &mut self,
        sender: &A,
        identifier: &CandidateKeyPartIdentifier,
    ) -> Result<(), ProtocolError> {
        if self.config.send_matches {
            self.send(
                sender,
                Message::Match {
                    round: identifier.round,
                    number: identifier.number,
                },
            );
        }
        self.progress(
            sender,
            STAGE_PART_MATCHED,
            format!("matched candidate {} from {}", identifier.index(), sender),
        );
        self.check_key_generation(sender);
        self.replay_proposals()
    }

    fn on_match(&mut self, sender: &A, round: u32, number: u8) -> Result<(), ProtocolError> {
        let before = self.engine.num_promoted(sender);
        if !self.engine.acknowledge_matches(sender, round, number) {
            return Ok(());
        }
        if self.engine.num_promoted(sender) > before {
            self.progress(
                sender,
                STAGE_PART_MATCHED,
                format!("{} matched our candidate {}.{}", sender, round, number),
            );
        }
        self.check_key_generation(sender);
        self.replay_proposals()
    }

    fn on_key_proposal(&mut self, sender: &A, proposal: KeyProposal) -> Result<(), ProtocolError> {
        if !self.try_key_proposal(sender, &proposal)? {
            tracing::debug!(
                "buffering key proposal {} from {} for later",
                proposal.digest,
                sender
            );
            self.proposal_replay.push(BufferedProposal {
                sender: sender.clone(),
                proposal,
            });
        }
        Ok(())
    }

    /// Returns true if the proposal was consumed
    fn try_key_proposal(&mut self, sender: &A, proposal: &KeyProposal) -> Result<bool, ProtocolError> {
        let Some(key) = self.engine.search_key(
            sender,
            &proposal.digest,
            &proposal.receiver_indices,
            &proposal.sender_indices,
        ) else {
            return Ok(false);
        };

        let strict = self.config.engine.strict_digest_length;
        if !digests_match(key.digest().as_bytes(), proposal.digest.as_bytes(), strict) {
            let detail = format!(
                "reconstructed key {} while searching for {}",
                key.digest(),
                proposal.digest
            );
            tracing::error!("{}", detail);
            self.fail(sender, FailureCause::Internal(detail.clone()), None, true);
            return Err(ProtocolError::InternalInconsistency(detail));
        }

        match self.engine.check_criteria(sender) {
            CriteriaOutcome::CanGenerateKey => {}
            CriteriaOutcome::NotYet => {
                tracing::debug!(
                    "found key {} from {} but local criteria are not met yet",
                    key.digest(),
                    sender
                );
                return Ok(false);
            }
            CriteriaOutcome::ShouldAbort => {
                self.abort(sender);
                return Ok(true);
            }
        }

        self.stage_one(sender, key);
        Ok(true)
    }

    /// Record `key` as tentatively confirmed, subject to the overwrite guard,
    /// and acknowledge it
    fn stage_one(&mut self, peer: &A, key: CandidateKey) {
        let max_blocked = self.config.max_blocked_overwrites;
        let handshake = self
            .handshakes
            .entry(peer.clone())
            .or_insert_with(|| KeyHandshake::new(self.config.recent_keys_size));

        match handshake.tentative.as_ref().map(|k| k.digest().clone()) {
            Some(pending) if &pending == key.digest() => {
                tracing::debug!("re-acknowledging key {} from {}", pending, peer);
            }
            Some(pending) => {
                handshake.overwrite_blocked += 1;
                if handshake.overwrite_blocked <= max_blocked {
                    tracing::warn!(
                        "not overwriting tentative key {} with {} from {} ({} blocked)",
                        pending,
                        key.digest(),
                        peer,
                        handshake.overwrite_blocked
                    );
                    return;
                }
                tracing::warn!(
                    "overwriting tentative key {} with {} from {} after {} blocked attempts",
                    pending,
                    key.digest(),
                    peer,
                    max_blocked
                );
                handshake.overwrite_blocked = 0;
                handshake.tentative = Some(key.clone());
            }
            None => handshake.tentative = Some(key.clone()),
        }

        let digest = key.digest().clone();
        self.send(
            peer,
            Message::Ack {
                digest: digest.clone(),
            },
        );
        self.progress(
            peer,
            STAGE_KEY_TENTATIVE,
            format!("acknowledged key {} from {}", digest, peer),
        );
    }

    fn on_ack(&mut self, sender: &A, digest: &Digest) -> Result<(), ProtocolError> {
        // duplicated or late ACKs of a finalized key arrive after the wipe;
        // they must neither fail the pairing nor NACK the peer
        if !self.has_state(sender) {
            tracing::debug!("ignoring key acknowledgment from {} without a session", sender);
            return Ok(());
        }
        let strict = self.config.engine.strict_digest_length;
        let handshake = self.handshakes.get(sender);
        let acknowledged = handshake.and_then(|h| {
            h.recent_keys
                .iter()
                .rev()
                .find(|k| digests_match(k.digest().as_bytes(), digest.as_bytes(), strict))
                .cloned()
        });
        let tentative = handshake.and_then(|h| h.tentative.clone());

        // stage 2
        let final_key = match (&acknowledged, &tentative) {
            (Some(acked), None) => {
                // the peer may hold our key as its tentative one; echo so it
                // can finalize too
                self.send(
                    sender,
                    Message::Ack {
                        digest: acked.digest().clone(),
                    },
                );
                acked.key().clone()
            }
            (Some(acked), Some(pending)) if acked.key() == pending.key() => acked.key().clone(),
            (Some(acked), Some(pending)) => {
                tracing::info!(
                    "{} acknowledged {} while {} is pending, combining both",
                    sender,
                    acked.digest(),
                    pending.digest()
                );
                acked.key().xor(pending.key())
            }
            (None, Some(pending))
                if digests_match(pending.digest().as_bytes(), digest.as_bytes(), strict) =>
            {
                pending.key().clone()
            }
            _ => {
                tracing::warn!("{} acknowledged unknown key {}", sender, digest);
                self.fail(
                    sender,
                    FailureCause::Anomaly(format!("acknowledgment for unknown key {}", digest)),
                    None,
                    true,
                );
                return Ok(());
            }
        };

        self.finalize(sender, final_key);
        Ok(())
    }

    fn on_nack(&mut self, sender: &A) {
        if !self.has_state(sender) {
            tracing::debug!("ignoring termination from {} without a session", sender);
            return;
        }
        tracing::info!("{} terminated the session", sender);
        self.fail(sender, FailureCause::PeerTerminated, None, false);
    }

    /// Generate and propose a key if the criteria allow it, abort if they say so
    fn check_key_generation(&mut self, peer: &A) {
        match self.engine.check_criteria(peer) {
            CriteriaOutcome::CanGenerateKey => {}
            CriteriaOutcome::NotYet => return,
            CriteriaOutcome::ShouldAbort => {
                self.abort(peer);
                return;
            }
        }
        let key = match self.engine.generate_key(peer) {
            Ok(key) => key,
            Err(err) => {
                tracing::debug!("criteria met for {} but no key yet: {}", peer, err);
                return;
            }
        };

        let proposal = KeyProposal::from(&key);
        let handshake = self
            .handshakes
            .entry(peer.clone())
            .or_insert_with(|| KeyHandshake::new(self.config.recent_keys_size));
        let known = handshake
            .recent_keys
            .iter()
            .any(|k| k.digest() == key.digest());
        if !known {
            handshake.recent_keys.push(key);
        }

        tracing::debug!(
            "proposing key {} with {} parts to {}",
            proposal.digest,
            proposal.num_parts(),
            peer
        );
        let message = format!("proposed key {} to {}", proposal.digest, peer);
        self.send(peer, Message::Key(proposal));
        self.progress(peer, STAGE_KEY_PROPOSED, message);
    }

    fn abort(&mut self, peer: &A) {
        let rounds = self.engine.local_rounds(peer);
        let mismatched_fraction = 1.0 - self.engine.match_fraction(peer);
        tracing::info!(
            "aborting session with {}: {:.2} of {} rounds without a match",
            peer,
            mismatched_fraction,
            rounds
        );
        self.fail(
            peer,
            FailureCause::CriteriaAbort {
                rounds,
                mismatched_fraction,
            },
            Some("too many rounds without matching key parts".to_string()),
            true,
        );
    }

    /// Match buffered CAND messages against the current local history
    fn replay_candidates(&mut self) -> Result<(), ProtocolError> {
        let buffered = self.candidate_replay.drain();
        let mut result = Ok(());
        let mut keep = Vec::with_capacity(buffered.len());
        for message in buffered {
            let sender = &message.sender;
            if !self.engine.has_session(sender) {
                continue;
            }
            let before = self.engine.num_promoted(sender);
            if let Some(position) = self.engine.match_candidates(sender, &message.identifiers) {
                if self.engine.num_promoted(sender) > before {
                    tracing::debug!("buffered candidates from {} match now", sender);
                    if let Err(err) =
                        self.on_matching_part(sender, &message.identifiers[position])
                    {
                        result = Err(err);
                    }
                }
            }
            if self.engine.has_session(sender) {
                keep.push(message);
            }
        }
        for message in keep {
            self.candidate_replay.push(message);
        }
        result
    }

    /// Retry buffered key proposals
    fn replay_proposals(&mut self) -> Result<(), ProtocolError> {
        let buffered = self.proposal_replay.drain();
        let mut result = Ok(());
        let mut keep = Vec::with_capacity(buffered.len());
        for message in buffered {
            let had_state = self.has_state(&message.sender);
            match self.try_key_proposal(&message.sender, &message.proposal) {
                Ok(true) => {}
                Ok(false) => {
                    // skip proposals whose session ended meanwhile
                    if !had_state || self.has_state(&message.sender) {
                        keep.push(message);
                    }
                }
                Err(err) => result = Err(err),
            }
        }
        for message in keep {
            self.proposal_replay.push(message);
        }
        result
    }

    fn finalize(&mut self, peer: &A, key: SharedKey) {
        let match_fraction = self.engine.match_fraction(peer);
        self.wipe(peer);
        self.stats.successes += 1;
        tracing::info!(
            target: "ckp::statistics",
            %peer,
            match_fraction,
            datagrams_sent = self.stats.datagrams_sent,
            bytes_sent = self.stats.bytes_sent,
            "key agreement succeeded"
        );
        self.effects.push(Effect::Event(ProtocolEvent::Success {
            peer: peer.clone(),
            shared_key: key,
            match_fraction,
        }));
    }

    fn fail(&mut self, peer: &A, cause: FailureCause, message: Option<String>, send_nack: bool) {
        let match_fraction = self.engine.match_fraction(peer);
        let had_state = self.wipe(peer);
        if had_state && send_nack {
            self.send(peer, Message::Nack);
        }
        self.stats.failures += 1;
        tracing::info!(
            target: "ckp::statistics",
            %peer,
            match_fraction,
            %cause,
            "key agreement failed"
        );
        self.effects.push(Effect::Event(ProtocolEvent::Failure {
            peer: peer.clone(),
            match_fraction,
            cause: Some(cause),
            message,
        }));
    }

    /// Forget `peer` entirely, zeroizing its key material
    pub(crate) fn wipe(&mut self, peer: &A) -> bool {
        let had_session = self.engine.wipe(peer);
        let had_handshake = self.handshakes.remove(peer).is_some();
        self.candidate_replay.retain(|m| &m.sender != peer);
        self.proposal_replay.retain(|m| &m.sender != peer);
        had_session || had_handshake
    }

    pub(crate) fn wipe_all(&mut self) {
        self.engine.wipe_all();
        self.handshakes.clear();
        self.candidate_replay.clear();
        self.proposal_replay.clear();
    }
}
