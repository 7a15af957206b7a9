pub mod utils;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use common::protocol::{CandidateKeyProtocol, EventChannel, ProtocolError};
use common::transport::DatagramTransport;

use crate::config::{ConfigError, DaemonConfig, LoggingConfig};
use crate::udp::{self, TransportError, UdpTransport};
use crate::{events, input};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle for gracefully shutting down the daemon service.
pub struct ShutdownHandle {
    graceful_waiter: tokio::task::JoinHandle<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown_tx: watch::Sender<()>,
}

impl ShutdownHandle {
    /// Block until the service shuts down (via signal or explicit shutdown).
    pub async fn wait(self) {
        let _ = self.graceful_waiter.await;

        if timeout(FINAL_SHUTDOWN_TIMEOUT, join_all(self.handles))
            .await
            .is_err()
        {
            tracing::error!(
                "Failed to shut down within {} seconds",
                FINAL_SHUTDOWN_TIMEOUT.as_secs()
            );
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A running protocol instance bound to a UDP socket
#[derive(Clone)]
pub struct Service {
    pub protocol: CandidateKeyProtocol<SocketAddr>,
    pub local_addr: SocketAddr,
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
///
/// Logs go to stderr so that stdout carries nothing but event lines.
pub fn init_logging(
    config: &LoggingConfig,
) -> Result<Vec<tracing_appender::non_blocking::WorkerGuard>, ConfigError> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let level = config.level()?;
    let mut guards = Vec::new();

    let (stderr_writer, stderr_guard) = tracing_appender::non_blocking(std::io::stderr());
    guards.push(stderr_guard);

    let stderr_env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stderr_writer)
        .with_filter(stderr_env_filter);

    if let Some(log_dir) = &config.dir {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Failed to create log directory {:?}: {}",
                log_dir, e
            );
        }

        let file_appender = tracing_appender::rolling::daily(log_dir, "ckp.log");
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        let file_env_filter = EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy();

        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_writer)
            .with_ansi(false)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(file_env_filter);

        tracing_subscriber::registry()
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry().with(stderr_layer).init();
    }

    utils::register_panic_logger();
    utils::report_build_info();

    Ok(guards)
}

/// Bind the socket and spawn the receive loop, the candidate reader over
/// `input` and the event printer, returning the running service.
pub async fn start_service<R>(
    config: &DaemonConfig,
    input: R,
) -> Result<(Service, ShutdownHandle), ServiceError>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    config.validate()?;
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;

    let udp = UdpTransport::bind(&config.network).await?;
    let local_addr = udp.local_addr()?;
    let socket = udp.socket();
    let transport: Arc<dyn DatagramTransport<SocketAddr>> = Arc::new(udp);
    let protocol = CandidateKeyProtocol::new(config.protocol.clone(), transport)?;
    let (channel, event_rx) = EventChannel::new();
    protocol.subscribe(Arc::new(channel));

    let mut handles = Vec::new();

    let recv_protocol = protocol.clone();
    let recv_rx = shutdown_rx.clone();
    let recv_tx = shutdown_tx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = udp::receive_loop(socket, recv_protocol, recv_rx).await {
            tracing::error!("Receive loop error: {}", e);
            let _ = recv_tx.send(());
        }
    }));

    let input_protocol = protocol.clone();
    let input_rx = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = input::read_batches(input, input_protocol, input_rx).await {
            tracing::error!("Candidate input error: {}", e);
        }
    }));

    let events_rx = shutdown_rx.clone();
    handles.push(tokio::spawn(async move {
        if let Err(e) = events::print_events(event_rx, tokio::io::stdout(), events_rx).await {
            tracing::error!("Event output error: {}", e);
        }
    }));

    tracing::info!(
        "Running: listening on {}, advertising to {}",
        local_addr,
        config.network.group_addr
    );

    let service = Service {
        protocol,
        local_addr,
    };
    let handle = ShutdownHandle {
        graceful_waiter,
        handles,
        shutdown_tx,
    };
    Ok((service, handle))
}

/// Runs the daemon with candidates from stdin until a shutdown signal.
pub async fn spawn_service(config: &DaemonConfig) -> Result<(), ServiceError> {
    let _guards = init_logging(&config.logging)?;
    let stdin = BufReader::new(tokio::io::stdin());
    let (service, handle) = start_service(config, stdin).await?;
    handle.wait().await;

    service.protocol.wipe_all();
    let stats = service.protocol.stats();
    tracing::info!(
        target: "ckp::statistics",
        rounds = stats.candidate_rounds,
        successes = stats.successes,
        failures = stats.failures,
        datagrams_sent = stats.datagrams_sent,
        datagrams_received = stats.datagrams_received,
        "daemon stopped"
    );
    Ok(())
}
