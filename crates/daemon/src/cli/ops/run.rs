use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Args;

use ckp_daemon::state::AppState;
use ckp_daemon::spawn_service;

/// Run the protocol, reading candidate rounds from stdin and writing events
///  to stdout as JSON lines
#[derive(Args, Debug, Clone)]
pub struct Run {
    /// Override the listen address from the config
    #[arg(long)]
    pub listen_addr: Option<SocketAddr>,

    /// Override the multicast group or unicast peer from the config
    #[arg(long)]
    pub group_addr: Option<SocketAddr>,

    /// Override the default log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Directory for log files (logs to stderr only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("state error: {0}")]
    StateError(#[from] ckp_daemon::state::StateError),

    #[error("service failed: {0}")]
    Service(#[from] ckp_daemon::ServiceError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Run {
    type Error = RunError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;

        let mut config = state.config;
        if let Some(addr) = self.listen_addr {
            config.network.listen_addr = addr;
        }
        if let Some(addr) = self.group_addr {
            config.network.group_addr = addr;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.logging.dir = Some(dir.clone());
        }

        spawn_service(&config).await?;
        Ok("ckp stopped".to_string())
    }
}
