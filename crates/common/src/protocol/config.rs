use serde::{Deserialize, Serialize};

use crate::engine::{ConfigError, EngineConfig};

use super::message::{MAX_DATAGRAM_SIZE, MIN_DATAGRAM_SIZE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Matching and admission settings
    pub engine: EngineConfig,
    /// Multicast identifiers for every local round
    pub broadcast_candidates: bool,
    /// Tell the sender of a CAND message which of its identifiers matched
    pub send_matches: bool,
    /// Upper bound for one datagram; CAND rounds are split to fit
    pub max_datagram_size: usize,
    /// Attached to every log line of this instance
    pub instance_id: Option<String>,
    /// Differing key proposals ignored while a tentative key is pending,
    /// before the newer one is allowed to replace it
    pub max_blocked_overwrites: u32,
    /// Early CAND and KEY messages kept for replay, per kind
    pub replay_buffer_size: usize,
    /// Generated keys remembered per peer for acknowledgment lookup
    pub recent_keys_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            broadcast_candidates: true,
            send_matches: true,
            max_datagram_size: MAX_DATAGRAM_SIZE,
            instance_id: None,
            max_blocked_overwrites: 20,
            replay_buffer_size: 5,
            recent_keys_size: 5,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        if self.replay_buffer_size == 0 {
            return Err(ConfigError::ZeroCapacity("replay_buffer_size"));
        }
        if self.recent_keys_size == 0 {
            return Err(ConfigError::ZeroCapacity("recent_keys_size"));
        }
        if !(MIN_DATAGRAM_SIZE..=MAX_DATAGRAM_SIZE).contains(&self.max_datagram_size) {
            return Err(ConfigError::Invalid(format!(
                "max_datagram_size must be between {} and {}, got {}",
                MIN_DATAGRAM_SIZE, MAX_DATAGRAM_SIZE, self.max_datagram_size
            )));
        }
        Ok(())
    }
}
