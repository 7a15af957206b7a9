//! Integration tests for the candidate key engine on its own

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use ::common::crypto::part_digest;
use ::common::engine::{
    CandidateKeyEngine, CandidateKeyPartIdentifier, CriteriaOutcome, EngineConfig, EngineError,
};
use ::common::testkit::ManualClock;

type Engine = CandidateKeyEngine<&'static str>;

fn random_parts(count: usize) -> Vec<[u8; 24]> {
    (0..count).map(|_| rand::random()).collect()
}

fn criteria_config() -> EngineConfig {
    EngineConfig {
        min_num_rounds_for_action: 5,
        min_matching_rounds_fraction: 0.6,
        max_mismatch_rounds_fraction: 0.4,
        min_matching_entropy: 3.0,
        ..Default::default()
    }
}

fn unrelated_identifier() -> CandidateKeyPartIdentifier {
    CandidateKeyPartIdentifier {
        round: 1,
        number: 0,
        digest: part_digest(b"seen by nobody else"),
    }
}

#[test]
fn test_identifiers_describe_unique_parts() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(4);
    let with_duplicates = vec![parts[0], parts[1], parts[0], parts[2], parts[3], parts[1]];

    let ids = engine.generate_candidates(&with_duplicates, 8.0).unwrap();
    assert_eq!(ids.len(), 4);
    for (number, (id, raw)) in ids.iter().zip(&parts).enumerate() {
        assert_eq!(id.round, 1);
        assert_eq!(id.number as usize, number);
        assert_eq!(id.digest, part_digest(raw));
    }
    let digests: HashSet<_> = ids.iter().map(|id| id.digest.clone()).collect();
    assert_eq!(digests.len(), ids.len());
}

#[test]
fn test_rounds_increase() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    let mut last = 0;
    for _ in 0..10 {
        let ids = engine.generate_candidates(&random_parts(2), 1.0).unwrap();
        assert!(ids.iter().all(|id| id.round == ids[0].round));
        assert!(ids[0].round > last);
        last = ids[0].round;
        assert_eq!(engine.current_round(), Some(last));
    }
}

#[test]
fn test_engines_with_common_parts_match() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(3);

    let from_alice = alice.generate_candidates(&parts, 1.0).unwrap();
    let from_bob = bob.generate_candidates(&parts, 1.0).unwrap();

    for id in &from_alice {
        assert_eq!(bob.match_candidates(&"alice", &[id.clone()]), Some(0));
    }
    for id in &from_bob {
        assert_eq!(alice.match_candidates(&"bob", &[id.clone()]), Some(0));
    }
    assert_eq!(alice.num_promoted(&"bob"), 3);
    assert_eq!(bob.num_promoted(&"alice"), 3);
}

#[test]
fn test_only_shared_parts_match() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let [x, y, z, w]: [[u8; 24]; 4] = rand::random();

    let from_alice = alice.generate_candidates(&[x, y, z], 1.0).unwrap();
    bob.generate_candidates(&[y, z, w], 1.0).unwrap();

    assert_eq!(bob.match_candidates(&"alice", &from_alice[..1]), None);
    assert_eq!(bob.match_candidates(&"alice", &from_alice), Some(1));
    assert_eq!(bob.match_candidates(&"alice", &from_alice[2..]), Some(0));
}

#[test]
fn test_evicted_parts_no_longer_match() {
    let config = EngineConfig {
        history_size: 4,
        ..Default::default()
    };
    let mut alice = Engine::new(config).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(5);

    let mut advertised = Vec::new();
    for part in &parts {
        alice.generate_candidates(&[part], 1.0).unwrap();
        advertised.extend(bob.generate_candidates(&[part], 1.0).unwrap());
    }

    assert_eq!(alice.match_candidates(&"bob", &advertised[..1]), None);
    assert_eq!(alice.match_candidates(&"bob", &advertised[4..]), Some(0));
    assert_eq!(alice.match_candidates(&"bob", &advertised[1..2]), Some(0));
}

#[test]
fn test_repeated_matches_count_once() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(1);

    let from_alice = alice.generate_candidates(&parts, 2.5).unwrap();
    let from_bob = bob.generate_candidates(&parts, 2.5).unwrap();

    assert!(bob.match_candidates(&"alice", &from_alice).is_some());
    assert!(bob.match_candidates(&"alice", &from_alice).is_some());
    assert_eq!(bob.entropy_sum(&"alice"), 2.5);

    let id = &from_alice[0];
    assert!(alice.acknowledge_matches(&"bob", id.round, id.number));
    assert!(alice.acknowledge_matches(&"bob", id.round, id.number));
    assert!(alice.match_candidates(&"bob", &from_bob).is_some());
    assert_eq!(alice.entropy_sum(&"bob"), 2.5);
    assert_eq!(alice.num_promoted(&"bob"), 1);
}

#[test]
fn test_acknowledging_unknown_part_is_rejected() {
    let mut engine = Engine::new(EngineConfig::default()).unwrap();
    engine.generate_candidates(&random_parts(1), 1.0).unwrap();
    assert!(!engine.acknowledge_matches(&"bob", 1, 5));
    assert!(!engine.acknowledge_matches(&"bob", 9, 0));
    assert_eq!(engine.num_promoted(&"bob"), 0);
}

#[test]
fn test_criteria_reach_key_generation_at_boundary() {
    let mut engine = Engine::new(criteria_config()).unwrap();
    let mut ids = Vec::new();
    ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    assert!(engine
        .match_candidates(&"bob", &[unrelated_identifier()])
        .is_none());
    for _ in 1..4 {
        ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    }
    assert_eq!(engine.check_criteria(&"bob"), CriteriaOutcome::NotYet);

    ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    for id in &ids[..3] {
        assert!(engine.acknowledge_matches(&"bob", id.round, id.number));
    }
    let stats = engine.statistics(&"bob").unwrap();
    assert_eq!(stats.local_rounds, 5);
    assert_eq!(stats.matches, 3);
    assert_eq!(stats.match_fraction, 0.6);
    assert_eq!(engine.check_criteria(&"bob"), CriteriaOutcome::CanGenerateKey);
}

#[test]
fn test_criteria_abort_when_rounds_stay_unmatched() {
    let mut engine = Engine::new(criteria_config()).unwrap();
    let mut ids = Vec::new();
    ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    engine.match_candidates(&"bob", &[unrelated_identifier()]);
    for _ in 1..4 {
        ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    }
    // not enough rounds yet, however bad they look
    assert_eq!(engine.check_criteria(&"bob"), CriteriaOutcome::NotYet);

    ids.extend(engine.generate_candidates(&random_parts(1), 1.0).unwrap());
    assert!(engine.acknowledge_matches(&"bob", ids[2].round, ids[2].number));
    let stats = engine.statistics(&"bob").unwrap();
    assert_eq!(stats.local_rounds, 5);
    assert_eq!(stats.matches, 1);
    assert_eq!(engine.check_criteria(&"bob"), CriteriaOutcome::ShouldAbort);
}

#[test]
fn test_unknown_peer_has_no_criteria() {
    let engine = Engine::new(criteria_config()).unwrap();
    assert_eq!(engine.check_criteria(&"nobody"), CriteriaOutcome::NotYet);
    assert!(engine.statistics(&"nobody").is_none());
    assert_eq!(engine.match_fraction(&"nobody"), 0.0);
}

#[test]
fn test_single_shared_part_across_rounds() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default())
        .unwrap()
        .with_first_round(7);
    let [p0, p1, p2]: [[u8; 24]; 3] = rand::random();

    let from_alice = alice.generate_candidates(&[p0, p1, p2], 4.0).unwrap();
    let from_bob = bob.generate_candidates(&[p1], 4.0).unwrap();
    assert_eq!(from_bob[0].round, 7);

    assert_eq!(bob.match_candidates(&"alice", &from_alice), Some(1));
    assert!(alice.acknowledge_matches(&"bob", from_alice[1].round, from_alice[1].number));

    for (engine, peer) in [(&alice, "bob"), (&bob, "alice")] {
        assert_eq!(engine.entropy_sum(&peer), 4.0);
        assert_eq!(engine.match_fraction(&peer), 1.0);
        assert_eq!(engine.local_rounds(&peer), 1);
    }
}

#[test]
fn test_keys_from_same_matches_agree() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();

    for _ in 0..3 {
        let parts = random_parts(2);
        let from_alice = alice.generate_candidates(&parts, 1.0).unwrap();
        bob.generate_candidates(&[parts[1], parts[0]], 1.0).unwrap();
        bob.match_candidates(&"alice", &from_alice).unwrap();
    }

    let key = bob.generate_key(&"alice").unwrap();
    alice.match_candidates(&"bob", &[unrelated_identifier()]);
    assert_eq!(key.local_indices().len(), 3);
    assert!(key.remote_indices().iter().all(Option::is_some));

    // alice resolves every part from her own history
    let found = alice
        .search_key(
            &"bob",
            key.digest(),
            key.remote_indices(),
            key.local_indices(),
        )
        .expect("alice could not rebuild the key");
    assert_eq!(found.key(), key.key());
    assert_eq!(alice.num_promoted(&"bob"), 3);

    // a digest that does not verify promotes nothing
    let mut other = Engine::new(EngineConfig::default()).unwrap();
    for _ in 0..3 {
        other.generate_candidates(&random_parts(2), 1.0).unwrap();
    }
    other.match_candidates(&"bob", &[unrelated_identifier()]);
    assert!(other
        .search_key(&"bob", key.digest(), key.remote_indices(), key.local_indices())
        .is_none());
    assert_eq!(other.num_promoted(&"bob"), 0);
}

#[test]
fn test_stale_matches_are_pruned() {
    let clock = Arc::new(ManualClock::new());
    let config = EngineConfig {
        max_match_age_secs: 10,
        ..Default::default()
    };
    let mut alice = Engine::with_clock(config, clock.clone()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(1);

    alice.generate_candidates(&parts, 5.0).unwrap();
    let from_bob = bob.generate_candidates(&parts, 5.0).unwrap();
    assert!(alice.match_candidates(&"bob", &from_bob).is_some());
    assert!(alice.generate_key(&"bob").is_ok());

    clock.advance(Duration::from_secs(11));
    assert!(matches!(
        alice.generate_key(&"bob"),
        Err(EngineError::NoMatchedParts(_))
    ));
    // statistics survive pruning, and the part is not promoted again
    assert_eq!(alice.entropy_sum(&"bob"), 5.0);
    assert!(alice.match_candidates(&"bob", &from_bob).is_some());
    assert_eq!(alice.entropy_sum(&"bob"), 5.0);
    assert!(alice.generate_key(&"bob").is_err());
}

#[test]
fn test_wipe_drops_session() {
    let mut alice = Engine::new(EngineConfig::default()).unwrap();
    let mut bob = Engine::new(EngineConfig::default()).unwrap();
    let parts = random_parts(1);
    alice.generate_candidates(&parts, 1.0).unwrap();
    let from_bob = bob.generate_candidates(&parts, 1.0).unwrap();
    alice.match_candidates(&"bob", &from_bob);
    alice.match_candidates(&"carol", &from_bob);

    assert!(alice.wipe(&"bob"));
    assert!(!alice.has_session(&"bob"));
    assert!(matches!(
        alice.generate_key(&"bob"),
        Err(EngineError::UnknownPeer(_))
    ));
    assert!(alice.has_session(&"carol"));

    alice.wipe_all();
    assert_eq!(alice.peers().count(), 0);
}
