//! Configuration for the ledger

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// File locations
    pub storage: StorageConfig,

    /// Accounts that must have a snapshot at bootstrap
    #[serde(default)]
    pub accounts: Vec<AccountId>,

    /// Single-writer queue configuration
    #[serde(default)]
    pub actor: ActorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::with_data_dir("./data/ledger")
    }
}

/// File locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Write-ahead log
    pub log_path: PathBuf,

    /// Checkpoint marker
    pub checkpoint_path: PathBuf,

    /// Directory of per-account snapshots
    pub snapshot_dir: PathBuf,
}

impl StorageConfig {
    /// Standard layout under `data_dir`
    pub fn in_dir(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            log_path: data_dir.join("wal.log"),
            checkpoint_path: data_dir.join("offset.meta"),
            snapshot_dir: data_dir.join("snapshots"),
        }
    }
}

/// Single-writer queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Bounded mailbox size
    pub mailbox_capacity: usize,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1000,
        }
    }
}

impl Config {
    /// Default configuration with all files under `data_dir`
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            service_name: "durable-ledger".to_string(),
            storage: StorageConfig::in_dir(data_dir),
            accounts: Vec::new(),
            actor: ActorConfig::default(),
        }
    }

    /// Require these accounts at bootstrap
    pub fn with_accounts<I, A>(mut self, accounts: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<AccountId>,
    {
        self.accounts = accounts.into_iter().map(Into::into).collect();
        self
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = match std::env::var("LEDGER_DATA_DIR") {
            Ok(data_dir) => Config::with_data_dir(data_dir),
            Err(_) => Config::default(),
        };

        if let Ok(path) = std::env::var("LEDGER_LOG_PATH") {
            config.storage.log_path = PathBuf::from(path);
        }

        if let Ok(path) = std::env::var("LEDGER_CHECKPOINT_PATH") {
            config.storage.checkpoint_path = PathBuf::from(path);
        }

        if let Ok(dir) = std::env::var("LEDGER_SNAPSHOT_DIR") {
            config.storage.snapshot_dir = PathBuf::from(dir);
        }

        if let Ok(accounts) = std::env::var("LEDGER_ACCOUNTS") {
            config.accounts = parse_accounts(&accounts);
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> crate::Result<()> {
        if self.storage.log_path == self.storage.checkpoint_path {
            return Err(crate::Error::Config(
                "log_path and checkpoint_path must differ".to_string(),
            ));
        }

        if self.actor.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "actor.mailbox_capacity must be positive".to_string(),
            ));
        }

        if let Some(bad) = self.accounts.iter().find(|a| !a.is_valid_file_stem()) {
            return Err(crate::Error::InvalidAccount(bad.as_str().to_string()));
        }

        Ok(())
    }
}

fn parse_accounts(list: &str) -> Vec<AccountId> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(AccountId::new)
        .collect()
}
