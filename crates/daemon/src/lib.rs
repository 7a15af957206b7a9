// Configuration and on-disk state
pub mod config;
pub mod state;

// Service modules (daemon functionality)
pub mod events;
pub mod input;
pub mod process;
pub mod udp;
pub mod version;

pub use config::{DaemonConfig, LoggingConfig, NetworkConfig};
pub use process::{spawn_service, start_service, Service, ServiceError, ShutdownHandle};
pub use state::{AppState, StateError};
