//! Per-account snapshots
//!
//! One JSON file per account, `<snapshot_dir>/<account_id>.json`. Each file
//! is replaced atomically on its own; there is no atomicity across
//! accounts. A crash part-way through [`SnapshotStore::persist`] leaves a
//! mix of old and new files, which is safe because the checkpoint has not
//! advanced and every new file still carries the committed version it
//! replaced.

use crate::{
    state::LedgerState,
    storage,
    types::{AccountId, AccountSnapshot, Lsn, SnapshotVersion},
    Error, Result,
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SNAPSHOT_EXTENSION: &str = "json";

/// Directory of account snapshots
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Snapshot directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding `account`'s snapshot
    pub fn path_for(&self, account: &AccountId) -> Result<PathBuf> {
        if !account.is_valid_file_stem() {
            return Err(Error::InvalidAccount(account.as_str().to_string()));
        }
        Ok(self
            .dir
            .join(format!("{}.{}", account.as_str(), SNAPSHOT_EXTENSION)))
    }

    /// Create the snapshot for a new account
    pub fn provision(&self, account: &AccountId, balance: u64, lsn: Lsn) -> Result<AccountSnapshot> {
        let path = self.path_for(account)?;
        if path.exists() {
            return Err(Error::AccountExists(account.clone()));
        }

        let snapshot = AccountSnapshot {
            account_id: account.clone(),
            balance,
            lsn,
            committed: None,
        };
        self.write(&path, &snapshot)?;

        tracing::info!(account = %account, balance, lsn, "Account provisioned");
        Ok(snapshot)
    }

    /// Write every account in `state` as of `lsn`
    ///
    /// `committed` is the state at the last committed checkpoint. When `lsn`
    /// is ahead of it, each file keeps the committed balance alongside the
    /// new one.
    pub fn persist(
        &self,
        state: &LedgerState,
        lsn: Lsn,
        committed: Option<(&LedgerState, Lsn)>,
    ) -> Result<()> {
        for (account, balance) in state.iter() {
            let committed = committed
                .filter(|(_, committed_lsn)| *committed_lsn != lsn)
                .and_then(|(committed_state, committed_lsn)| {
                    committed_state
                        .balance(account)
                        .map(|balance| SnapshotVersion {
                            balance,
                            lsn: committed_lsn,
                        })
                });

            let snapshot = AccountSnapshot {
                account_id: account.clone(),
                balance,
                lsn,
                committed,
            };
            self.write(&self.path_for(account)?, &snapshot)?;
        }

        tracing::debug!(accounts = state.len(), lsn, "Snapshots persisted");
        Ok(())
    }

    /// Read a single account's snapshot file
    pub fn load(&self, account: &AccountId) -> Result<Option<AccountSnapshot>> {
        let path = self.path_for(account)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(decode(&path, &bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Rebuild the ledger state as of the committed checkpoint
    pub fn load_all(&self, committed_lsn: Lsn) -> Result<LedgerState> {
        let mut state = LedgerState::new();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(state),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }

            let snapshot = decode(&path, &fs::read(&path)?)?;
            if path.file_stem().and_then(|stem| stem.to_str())
                != Some(snapshot.account_id.as_str())
            {
                return Err(Error::Corruption(format!(
                    "snapshot {} holds account {}",
                    path.display(),
                    snapshot.account_id
                )));
            }

            let balance = snapshot.balance_at(committed_lsn).ok_or_else(|| {
                Error::Corruption(format!(
                    "snapshot for {} is at lsn {} with no version at checkpoint {}",
                    snapshot.account_id, snapshot.lsn, committed_lsn
                ))
            })?;
            state.open_account(snapshot.account_id, balance)?;
        }

        Ok(state)
    }

    fn write(&self, path: &Path, snapshot: &AccountSnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let contents = serde_json::to_vec(snapshot)?;
        storage::write_atomic(path, &contents)
    }
}

fn decode(path: &Path, bytes: &[u8]) -> Result<AccountSnapshot> {
    serde_json::from_slice(bytes).map_err(|e| {
        Error::Corruption(format!("snapshot {} is unreadable: {}", path.display(), e))
    })
}
