use crate::engine::{ArgumentError, ConfigError};

/// A datagram that does not parse as a protocol message
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("datagram is not valid UTF-8")]
    NotUtf8,
    #[error("empty datagram")]
    Empty,
    #[error("unknown message type '{0}'")]
    UnknownKind(String),
    #[error("{kind} message is missing field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
    #[error("{kind} message has {count} trailing fields")]
    TrailingFields { kind: &'static str, count: usize },
    #[error("invalid number '{0}'")]
    InvalidNumber(String),
    #[error("invalid hex field: {0}")]
    InvalidHex(#[from] hex::FromHexError),
    #[error("invalid index tuple '{0}'")]
    InvalidIndex(String),
    #[error("index list has {found} entries, expected {expected}")]
    IndexCount { expected: usize, found: usize },
    #[error("key proposal with an unknown sender index")]
    UnknownSenderIndex,
    #[error("key proposal without parts")]
    NoParts,
    #[error("candidate number {0} is out of range")]
    CandidateNumberOutOfRange(usize),
}

/// Why a session with a peer ended without a key
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureCause {
    #[error("{mismatched_fraction:.2} of {rounds} rounds had no matching key part")]
    CriteriaAbort {
        rounds: u32,
        mismatched_fraction: f64,
    },
    #[error("malformed message: {0}")]
    Decode(#[from] DecodeError),
    #[error("protocol anomaly: {0}")]
    Anomaly(String),
    #[error("peer terminated the session")]
    PeerTerminated,
    #[error("internal inconsistency: {0}")]
    Internal(String),
}

/// Errors returned to callers of the protocol
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid argument: {0}")]
    Argument(#[from] ArgumentError),
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A check that should never fail did; this points at a bug, not at the
    /// network
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
}
