use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Largest number of candidate key parts accepted in one round
///
/// Candidate numbers are carried as positions within a round, and the range
/// `0..=126` keeps them representable as a signed byte for older peers.
pub const MAX_CANDIDATES_PER_ROUND: usize = 127;

/// Tuning for a [`CandidateKeyEngine`](super::CandidateKeyEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of locally generated candidate key parts kept for matching
    pub history_size: usize,
    /// Number of matched parts kept per peer
    pub matched_history_size: usize,
    /// Matched parts older than this are pruned before a key is assembled
    pub max_match_age_secs: u64,
    /// Fraction of rounds that must contain a match before a key is generated
    pub min_matching_rounds_fraction: f64,
    /// Fraction of rounds without a match at which the session is aborted
    pub max_mismatch_rounds_fraction: f64,
    /// Rounds to observe with a peer before deciding anything
    pub min_num_rounds_for_action: u32,
    /// Entropy that matched parts must add up to before a key is generated
    pub min_matching_entropy: f64,
    /// Refuse to compare digests of different lengths instead of comparing
    /// their common prefix
    pub strict_digest_length: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_size: 20,
            matched_history_size: 40,
            max_match_age_secs: 300,
            min_matching_rounds_fraction: 0.6,
            max_mismatch_rounds_fraction: 0.4,
            min_num_rounds_for_action: 5,
            min_matching_entropy: 20.0,
            strict_digest_length: false,
        }
    }
}

impl EngineConfig {
    pub fn max_match_age(&self) -> Duration {
        Duration::from_secs(self.max_match_age_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history_size == 0 {
            return Err(ConfigError::ZeroCapacity("history_size"));
        }
        if self.matched_history_size == 0 {
            return Err(ConfigError::ZeroCapacity("matched_history_size"));
        }
        for (name, value) in [
            (
                "min_matching_rounds_fraction",
                self.min_matching_rounds_fraction,
            ),
            (
                "max_mismatch_rounds_fraction",
                self.max_mismatch_rounds_fraction,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::FractionOutOfRange { name, value });
            }
        }
        // the success and abort regions must not overlap
        if self.min_matching_rounds_fraction + self.max_mismatch_rounds_fraction > 1.0 {
            return Err(ConfigError::OverlappingCriteria {
                min_matching: self.min_matching_rounds_fraction,
                max_mismatch: self.max_mismatch_rounds_fraction,
            });
        }
        if !self.min_matching_entropy.is_finite() || self.min_matching_entropy < 0.0 {
            return Err(ConfigError::InvalidEntropy(self.min_matching_entropy));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_overlapping_criteria_rejected() {
        let config = EngineConfig {
            min_matching_rounds_fraction: 0.7,
            max_mismatch_rounds_fraction: 0.4,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OverlappingCriteria { .. })
        ));
    }

    #[test]
    fn test_zero_history_rejected() {
        let config = EngineConfig {
            history_size: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroCapacity("history_size"))
        );
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"min_num_rounds_for_action": 2}"#).unwrap();
        assert_eq!(config.min_num_rounds_for_action, 2);
        assert_eq!(config.history_size, 20);
    }
}
