//! Core types for the ledger
//!
//! Everything that crosses a file boundary is serialized as JSON:
//! - log records are JSON Lines (one [`LedgerEntry`] per line)
//! - the checkpoint is a single [`CheckpointMarker`]
//! - each account is a single [`AccountSnapshot`]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log sequence number: a byte offset into the log
pub type Lsn = u64;

/// Account identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id can name a snapshot file without escaping its directory
    pub fn is_valid_file_stem(&self) -> bool {
        !self.0.is_empty()
            && self.0.len() <= 128
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A transfer of value between two accounts, as recorded in the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique transaction identifier
    pub id: String,

    /// Account debited
    pub source_account: AccountId,

    /// Account credited
    pub destination_account: AccountId,

    /// Amount moved
    pub amount: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a new entry stamped with the current time
    pub fn new(
        id: impl Into<String>,
        source_account: impl Into<AccountId>,
        destination_account: impl Into<AccountId>,
        amount: u64,
    ) -> Self {
        Self {
            id: id.into(),
            source_account: source_account.into(),
            destination_account: destination_account.into(),
            amount,
            created_at: Utc::now(),
        }
    }

    /// Encode as a single newline-terminated log record
    pub fn to_record(&self) -> crate::Result<Vec<u8>> {
        let mut record = serde_json::to_vec(self)?;
        record.push(b'\n');
        Ok(record)
    }
}

/// Byte range a record occupies in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogPosition {
    /// Offset of the first byte of the record
    pub offset: Lsn,
    /// Record length including the trailing newline
    pub len: u64,
}

impl LogPosition {
    /// Offset just past the record
    pub fn end(&self) -> Lsn {
        self.offset + self.len
    }
}

/// Result of folding one entry into the ledger state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOutcome {
    /// Source debited, destination credited
    Applied,
    /// Source balance was below the amount; recorded but not applied
    InsufficientFunds,
}

/// Persisted checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMarker {
    /// Log bytes fully reflected in the snapshots
    pub lsn: Lsn,
}

/// A balance together with the LSN it is valid at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotVersion {
    /// Account balance
    pub balance: u64,
    /// LSN the balance reflects
    pub lsn: Lsn,
}

/// Persisted per-account balance
///
/// `committed` holds the version this snapshot replaced while the new one is
/// still ahead of the committed checkpoint. Bootstrap picks whichever
/// version matches the checkpoint, so a crash between snapshot and commit
/// never double-applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Account
    pub account_id: AccountId,

    /// Current balance
    pub balance: u64,

    /// LSN the balance reflects
    #[serde(default)]
    pub lsn: Lsn,

    /// Version at the committed checkpoint, when `lsn` is ahead of it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<SnapshotVersion>,
}

impl AccountSnapshot {
    /// Balance as of `lsn`, if this snapshot carries that version
    pub fn balance_at(&self, lsn: Lsn) -> Option<u64> {
        if self.lsn == lsn {
            return Some(self.balance);
        }
        self.committed
            .filter(|version| version.lsn == lsn)
            .map(|version| version.balance)
    }
}
