use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::protocol::ProtocolConfig;

/// Port used for both listening and the multicast group unless configured
pub const DEFAULT_PORT: u16 = 54321;
/// Administratively scoped group shared by all ckp hosts on the link
pub const DEFAULT_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 67, 75);

/// Everything read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub network: NetworkConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Local address to receive datagrams on
    pub listen_addr: SocketAddr,
    /// Where candidate advertisements go. A multicast address is joined on
    ///  `interface`; any other address is treated as the single peer to
    ///  advertise to
    pub group_addr: SocketAddr,
    /// Interface used for multicast membership, unspecified for the default
    pub interface: Ipv4Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            group_addr: SocketAddr::V4(SocketAddrV4::new(DEFAULT_GROUP, DEFAULT_PORT)),
            interface: Ipv4Addr::UNSPECIFIED,
        }
    }
}

impl NetworkConfig {
    pub fn is_multicast(&self) -> bool {
        self.group_addr.ip().is_multicast()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set
    pub level: String,
    /// Directory for daily rolling log files; logs go to stderr only if unset
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: None,
        }
    }
}

impl LoggingConfig {
    pub fn level(&self) -> Result<tracing::Level, ConfigError> {
        tracing::Level::from_str(&self.level)
            .map_err(|_| ConfigError::InvalidLogLevel(self.level.clone()))
    }
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.protocol.validate()?;
        self.logging.level()?;
        if self.network.is_multicast() && !self.network.group_addr.is_ipv4() {
            return Err(ConfigError::UnsupportedGroup(self.network.group_addr));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid protocol configuration: {0}")]
    Protocol(#[from] common::engine::ConfigError),

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),

    #[error("only IPv4 multicast groups are supported, got {0}")]
    UnsupportedGroup(SocketAddr),
}
