use std::net::SocketAddr;

use clap::Args;

use ckp_daemon::state::AppState;
use ckp_daemon::DaemonConfig;

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Local address to receive datagrams on (default: 0.0.0.0:54321)
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Multicast group, or a single peer address for unicast pairing
    ///  (default: 239.255.67.75:54321)
    #[arg(long)]
    pub group_addr: Option<SocketAddr>,

    /// Name attached to every log line of this host
    #[arg(long)]
    pub instance_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] ckp_daemon::state::StateError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = DaemonConfig::default();
        if let Some(addr) = self.listen_addr {
            config.network.listen_addr = addr;
        }
        if let Some(addr) = self.group_addr {
            config.network.group_addr = addr;
        }
        config.protocol.instance_id = self.instance_id.clone();

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;

        let mode = if state.config.network.is_multicast() {
            "multicast group"
        } else {
            "unicast peer"
        };
        let output = format!(
            "Initialized ckp directory at: {}\n\
             - Config: {}\n\
             - Listen address: {}\n\
             - Advertising to {}: {}",
            state.ckp_dir.display(),
            state.config_path.display(),
            state.config.network.listen_addr,
            mode,
            state.config.network.group_addr,
        );

        Ok(output)
    }
}
