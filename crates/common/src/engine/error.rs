/// Out-of-contract input to the engine, rejected before any state changes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArgumentError {
    #[error("no candidate key parts supplied")]
    Empty,
    #[error("{count} candidate key parts exceed the per-round maximum of {max}")]
    TooMany { count: usize, max: usize },
    #[error("{count} candidate key parts exceed the local history capacity of {capacity}")]
    ExceedsHistory { count: usize, capacity: usize },
    #[error("candidate key part {index} is {found} bytes long, expected {expected}")]
    UnequalLength {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("candidate key parts must not be empty")]
    EmptyPart,
    #[error("invalid entropy estimate {0}")]
    InvalidEntropy(f64),
    #[error("a digest of {len} bytes does not fit into a datagram of {max} bytes")]
    DatagramTooSmall { len: usize, max: usize },
}

/// Soft engine conditions the caller is expected to handle
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    #[error("no session for peer {0}")]
    UnknownPeer(String),
    #[error("no matched key parts for peer {0}")]
    NoMatchedParts(String),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),
    #[error("{name} = {value} is outside [0, 1]")]
    FractionOutOfRange { name: &'static str, value: f64 },
    #[error(
        "minimum matching fraction {min_matching} plus maximum mismatch fraction {max_mismatch} exceeds 1.0"
    )]
    OverlappingCriteria { min_matching: f64, max_mismatch: f64 },
    #[error("invalid minimum entropy {0}")]
    InvalidEntropy(f64),
    #[error("{0}")]
    Invalid(String),
}
