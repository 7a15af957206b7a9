use std::{fs, path::PathBuf};

use crate::config::{ConfigError, DaemonConfig};

pub const APP_NAME: &str = "ckp";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the ckp directory (~/.ckp)
    pub ckp_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: DaemonConfig,
}

impl AppState {
    /// Get the ckp directory path (custom or default ~/.ckp)
    pub fn ckp_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }
        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Create the ckp directory and write `config` (or the defaults) to it
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<DaemonConfig>,
    ) -> Result<Self, StateError> {
        let ckp_dir = Self::ckp_dir(custom_path)?;
        let config_path = ckp_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        let config = config.unwrap_or_default();
        config.validate()?;

        fs::create_dir_all(&ckp_dir)?;
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        Ok(Self {
            ckp_dir,
            config_path,
            config,
        })
    }

    /// Load existing state from the ckp directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let ckp_dir = Self::ckp_dir(custom_path)?;
        let config_path = ckp_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: DaemonConfig = toml::from_str(&config_toml)?;
        config.validate()?;

        Ok(Self {
            ckp_dir,
            config_path,
            config,
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("ckp directory not initialized. Run 'ckp init' first")]
    NotInitialized,

    #[error("ckp directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
