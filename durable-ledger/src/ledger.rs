//! Main ledger orchestration layer
//!
//! Sequences the recovery/apply protocol over the log, checkpoint and
//! snapshot stores:
//!
//! 1. **Bootstrap**: load snapshots as of the committed checkpoint
//! 2. **Append**: durably append the submitted entry
//! 3. **Replay**: fold every byte past the checkpoint into the state
//! 4. **Snapshot**: persist every account at the new LSN
//! 5. **Commit**: write the new LSN, only after step 4 succeeded
//!
//! A crash anywhere leaves the checkpoint at its old value, so the next
//! bootstrap resolves the snapshots back to that checkpoint and replays the
//! same window to the same result.
//!
//! # Example
//!
//! ```no_run
//! use durable_ledger::{Config, Ledger, LedgerEntry};
//!
//! fn main() -> durable_ledger::Result<()> {
//!     let config = Config::with_data_dir("./data/ledger").with_accounts(["bos", "pune"]);
//!     let mut ledger = Ledger::open(config)?;
//!
//!     let receipt = ledger.submit(LedgerEntry::new("t1", "bos", "pune", 3))?;
//!     println!("committed through lsn {}", receipt.lsn);
//!
//!     Ok(())
//! }
//! ```

use crate::{
    checkpoint::CheckpointStore,
    metrics::Metrics,
    replay::{ReplayReport, Replayer},
    snapshot::SnapshotStore,
    state::LedgerState,
    types::{AccountId, EntryOutcome, LedgerEntry, LogPosition, Lsn},
    wal::WalWriter,
    Config, Error, Result,
};
use std::time::Instant;

/// Acknowledgement for a submitted entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitReceipt {
    /// Where the entry was appended
    pub position: LogPosition,
    /// Whether it moved value
    pub outcome: EntryOutcome,
    /// Checkpoint after the cycle
    pub lsn: Lsn,
}

/// Result of one replay/snapshot/commit cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Replay details
    pub replay: ReplayReport,
    /// Checkpoint after the cycle
    pub committed_lsn: Lsn,
}

/// Main ledger interface
#[derive(Debug)]
pub struct Ledger {
    config: Config,
    wal: WalWriter,
    checkpoint: CheckpointStore,
    replayer: Replayer,
    snapshots: SnapshotStore,
    state: LedgerState,
    committed_lsn: Lsn,
    metrics: Metrics,
}

impl Ledger {
    /// Open ledger with configuration
    ///
    /// Bootstraps from the snapshots and then runs a recovery cycle, so any
    /// log bytes past the checkpoint are applied before this returns.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let checkpoint = CheckpointStore::new(&config.storage.checkpoint_path);
        let committed_lsn = checkpoint.read()?;

        let wal = WalWriter::open(&config.storage.log_path)?;
        if committed_lsn > wal.len() {
            return Err(Error::InvariantViolation(format!(
                "checkpoint lsn {} is past the end of the log ({} bytes)",
                committed_lsn,
                wal.len()
            )));
        }

        let snapshots = SnapshotStore::new(&config.storage.snapshot_dir);
        let state = snapshots.load_all(committed_lsn)?;

        let missing: Vec<&str> = config
            .accounts
            .iter()
            .filter(|account| !state.contains(account))
            .map(AccountId::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Provisioning(format!(
                "no snapshot for account(s): {}",
                missing.join(", ")
            )));
        }

        let metrics = Metrics::new()?;
        metrics.record_commit(committed_lsn);

        tracing::info!(
            service = %config.service_name,
            accounts = state.len(),
            checkpoint = committed_lsn,
            log_len = wal.len(),
            "Ledger bootstrapped"
        );

        let mut ledger = Self {
            replayer: Replayer::new(&config.storage.log_path),
            config,
            wal,
            checkpoint,
            snapshots,
            state,
            committed_lsn,
            metrics,
        };
        ledger.recover()?;

        Ok(ledger)
    }

    /// Append an entry and run a full cycle
    ///
    /// Entries naming an unknown account are refused before they reach the
    /// log. If the cycle fails after the append, the error is
    /// [`Error::CycleFailed`]: the entry stays durable, is applied by the
    /// next successful cycle, and must not be submitted again.
    pub fn submit(&mut self, entry: LedgerEntry) -> Result<SubmitReceipt> {
        self.ensure_checkpoint_current()?;

        for account in [&entry.source_account, &entry.destination_account] {
            if !self.state.contains(account) {
                return Err(Error::UnknownAccount {
                    account: account.clone(),
                    entry_id: entry.id.clone(),
                    lsn: self.wal.len(),
                });
            }
        }

        let position = self.wal.append(&entry)?;
        self.metrics.record_append();

        let cycle = self.run_cycle().map_err(|e| Error::CycleFailed {
            entry_id: entry.id.clone(),
            position,
            source: Box::new(e),
        })?;
        let outcome = cycle
            .replay
            .entries
            .iter()
            .find(|report| report.position == position)
            .map(|report| report.outcome)
            .ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "entry {} at lsn {} was not replayed",
                    entry.id, position.offset
                ))
            })?;

        Ok(SubmitReceipt {
            position,
            outcome,
            lsn: cycle.committed_lsn,
        })
    }

    /// Replay, snapshot and commit whatever the log holds past the checkpoint
    pub fn recover(&mut self) -> Result<CycleReport> {
        self.run_cycle()
    }

    /// Provision a new account at the committed checkpoint
    pub fn provision_account(&mut self, account: AccountId, balance: u64) -> Result<()> {
        if self.state.contains(&account) {
            return Err(Error::AccountExists(account));
        }
        let lsn = self.ensure_checkpoint_current()?;
        self.snapshots.provision(&account, balance, lsn)?;
        self.state.open_account(account, balance)
    }

    fn run_cycle(&mut self) -> Result<CycleReport> {
        let committed = self.state.clone();

        match self.try_cycle(&committed) {
            Ok(report) => Ok(report),
            Err(e) => {
                // Memory must match the checkpoint so the next cycle
                // replays the same window from the same base.
                self.state = committed;
                tracing::error!(error = %e, checkpoint = self.committed_lsn, "Ledger cycle aborted");
                Err(e)
            }
        }
    }

    /// The checkpoint on disk must still be the one this ledger committed
    fn ensure_checkpoint_current(&self) -> Result<Lsn> {
        let on_disk = self.checkpoint.read()?;
        if on_disk != self.committed_lsn {
            return Err(Error::Corruption(format!(
                "checkpoint moved from {} to {} outside this ledger",
                self.committed_lsn, on_disk
            )));
        }
        Ok(on_disk)
    }

    fn try_cycle(&mut self, committed: &LedgerState) -> Result<CycleReport> {
        let start = self.ensure_checkpoint_current()?;

        let started = Instant::now();
        let replay = self.replayer.replay(start, &mut self.state)?;
        let replay_seconds = started.elapsed().as_secs_f64();

        if replay.end_lsn == start {
            self.metrics.record_replay(0, 0, replay_seconds);
            return Ok(CycleReport {
                replay,
                committed_lsn: start,
            });
        }

        let started = Instant::now();
        self.snapshots
            .persist(&self.state, replay.end_lsn, Some((committed, start)))?;
        self.metrics.record_snapshot(started.elapsed().as_secs_f64());

        self.commit(replay.end_lsn)?;
        // Counted once per committed window; an aborted cycle replays it again.
        self.metrics
            .record_replay(replay.applied(), replay.rejected(), replay_seconds);

        Ok(CycleReport {
            replay,
            committed_lsn: self.committed_lsn,
        })
    }

    fn commit(&mut self, lsn: Lsn) -> Result<()> {
        if lsn < self.committed_lsn {
            return Err(Error::InvariantViolation(format!(
                "checkpoint cannot move back from {} to {}",
                self.committed_lsn, lsn
            )));
        }

        let written = self.checkpoint.write(lsn);
        self.settle_commit(lsn, written)
    }

    /// Adopt `lsn` if the checkpoint file holds it, even when the write
    /// reported an error after the rename landed
    fn settle_commit(&mut self, lsn: Lsn, written: Result<()>) -> Result<()> {
        if let Err(e) = written {
            match self.checkpoint.read() {
                Ok(on_disk) if on_disk == lsn => {
                    tracing::warn!(lsn, error = %e, "Checkpoint replaced but not confirmed durable");
                }
                _ => return Err(e),
            }
        }

        self.committed_lsn = lsn;
        self.metrics.record_commit(lsn);

        tracing::info!(lsn, "Checkpoint committed");
        Ok(())
    }

    /// Current balances
    pub fn balances(&self) -> &LedgerState {
        &self.state
    }

    /// Balance of one account
    pub fn balance(&self, account: &AccountId) -> Option<u64> {
        self.state.balance(account)
    }

    /// Committed checkpoint
    pub fn checkpoint(&self) -> Lsn {
        self.committed_lsn
    }

    /// Log size in bytes
    pub fn log_len(&self) -> u64 {
        self.wal.len()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Configuration the ledger was opened with
    pub fn config(&self) -> &Config {
        &self.config
    }
}
