//! Error types for the ledger

use crate::types::{AccountId, LogPosition, Lsn};
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// IO error on the log, checkpoint or snapshot files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A log record references an account that is not provisioned
    #[error("Unknown account {account} in entry {entry_id} at lsn {lsn}")]
    UnknownAccount {
        /// The missing account
        account: AccountId,
        /// Transaction id of the offending entry
        entry_id: String,
        /// Offset of the offending record (the LSN reached before it)
        lsn: Lsn,
    },

    /// The entry is durable in the log but the cycle that followed failed
    ///
    /// The entry will be applied by the next successful cycle and must not
    /// be submitted again.
    #[error("Entry {entry_id} appended at lsn {} but cycle failed: {source}", .position.offset)]
    CycleFailed {
        /// Transaction id of the appended entry
        entry_id: String,
        /// Where the entry was appended
        position: LogPosition,
        /// Why the cycle failed
        source: Box<Error>,
    },

    /// A configured account has no snapshot
    #[error("Provisioning error: {0}")]
    Provisioning(String),

    /// Account is already provisioned
    #[error("Account already exists: {0}")]
    AccountExists(AccountId),

    /// Account id cannot be used as a snapshot name
    #[error("Invalid account id: {0:?}")]
    InvalidAccount(String),

    /// Persisted state cannot be trusted
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Invariant violation (lsn bounds, checkpoint regression, overflow)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// Concurrency error (writer mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Metrics(err.to_string())
    }
}

impl Error {
    /// True for referential integrity failures raised during replay
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::UnknownAccount { .. })
    }

    /// Log position of an entry that was appended before the error
    pub fn durable_position(&self) -> Option<LogPosition> {
        match self {
            Error::CycleFailed { position, .. } => Some(*position),
            _ => None,
        }
    }
}
