//! Shared helpers for protocol integration tests
#![allow(dead_code)]

use ::common::crypto::{derive_key, SharedKey};
use ::common::engine::EngineConfig;
use ::common::protocol::ProtocolConfig;
use ::common::testkit::TestNetwork;

pub const P0: &[u8; 8] = b"part-0-x";
pub const P1: &[u8; 8] = b"part-1-y";

/// Route library logs to the test output when RUST_LOG is set
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Thresholds low enough for a handful of rounds
pub fn quick_config() -> ProtocolConfig {
    ProtocolConfig {
        engine: EngineConfig {
            history_size: 16,
            min_num_rounds_for_action: 3,
            min_matching_rounds_fraction: 0.6,
            max_mismatch_rounds_fraction: 0.4,
            min_matching_entropy: 6.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Two rounds of one unit-entropy part each are enough for a key, one
/// matching round out of two is not yet an abort, and matches are not
/// acknowledged so that only CAND messages promote parts
pub fn race_config() -> ProtocolConfig {
    ProtocolConfig {
        engine: EngineConfig {
            history_size: 8,
            min_num_rounds_for_action: 2,
            min_matching_rounds_fraction: 0.4,
            max_mismatch_rounds_fraction: 0.6,
            min_matching_entropy: 2.0,
            ..Default::default()
        },
        send_matches: false,
        ..Default::default()
    }
}

/// The key bob proposes in [`setup_key_race`]
pub fn bob_key() -> SharedKey {
    derive_key(&[&P0[..], &P1[..]].concat())
}

/// The key alice proposes in [`setup_key_race`]
pub fn alice_key() -> SharedKey {
    derive_key(&[&P1[..], &P0[..]].concat())
}

/// Two peers that matched the same two parts in opposite order
///
/// Bob sees alice's rounds in order and proposes `key(p0 || p1)`; alice sees
/// bob's rounds newest first and proposes `key(p1 || p0)`. On return exactly
/// the two KEY datagrams are in flight.
pub fn setup_key_race() -> TestNetwork {
    init_tracing();
    let mut net = TestNetwork::new();
    net.add_peer("alice", race_config()).unwrap();
    net.add_peer("bob", race_config()).unwrap();

    for name in ["alice", "bob"] {
        let peer = net.peer(name).unwrap();
        peer.submit(&[P0], 1.0).unwrap();
        peer.submit(&[P1], 1.0).unwrap();
    }

    assert!(net.deliver_first(|d| d.is("CAND", "alice", "bob")).unwrap());
    assert!(net.deliver_first(|d| d.is("CAND", "alice", "bob")).unwrap());

    let bob_round_1 = net
        .sim()
        .take_first(|d| d.is("CAND", "bob", "alice"))
        .unwrap();
    let bob_round_2 = net
        .sim()
        .take_first(|d| d.is("CAND", "bob", "alice"))
        .unwrap();
    net.deliver(&bob_round_2).unwrap();
    net.deliver(&bob_round_1).unwrap();

    let kinds: Vec<(String, &str, &str)> = net
        .sim()
        .pending()
        .iter()
        .map(|d| (d.kind().to_string(), d.from, d.to))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("KEY".to_string(), "bob", "alice"),
            ("KEY".to_string(), "alice", "bob"),
        ]
    );
    net
}
