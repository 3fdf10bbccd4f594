//! Single-writer queue for the ledger
//!
//! Many async callers, one owner of the log/checkpoint/snapshot files:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to the writer mailbox          │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │           LedgerActor (dedicated OS thread)           │
//! │   append → replay → snapshot → commit, one at a time │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The writer runs on its own thread because every step blocks on fsync.

use crate::{
    ledger::{CycleReport, Ledger, SubmitReceipt},
    state::LedgerState,
    types::{AccountId, LedgerEntry, Lsn},
    Error, Result,
};
use std::thread;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
#[derive(Debug)]
pub enum LedgerMessage {
    /// Append an entry and run a full cycle
    Submit {
        /// Entry to append
        entry: LedgerEntry,
        /// Reply channel
        response: oneshot::Sender<Result<SubmitReceipt>>,
    },

    /// Run a recovery cycle
    Recover {
        /// Reply channel
        response: oneshot::Sender<Result<CycleReport>>,
    },

    /// Provision a new account
    ProvisionAccount {
        /// Account to create
        account: AccountId,
        /// Opening balance
        balance: u64,
        /// Reply channel
        response: oneshot::Sender<Result<()>>,
    },

    /// Get one balance
    GetBalance {
        /// Account to look up
        account: AccountId,
        /// Reply channel
        response: oneshot::Sender<Option<u64>>,
    },

    /// Get all balances
    GetBalances {
        /// Reply channel
        response: oneshot::Sender<LedgerState>,
    },

    /// Get the committed checkpoint
    GetCheckpoint {
        /// Reply channel
        response: oneshot::Sender<Lsn>,
    },

    /// Stop the writer
    Shutdown,
}

/// Owns the ledger and processes messages one at a time
#[derive(Debug)]
pub struct LedgerActor {
    ledger: Ledger,
    mailbox: mpsc::Receiver<LedgerMessage>,
}

impl LedgerActor {
    /// Create new actor
    pub fn new(ledger: Ledger, mailbox: mpsc::Receiver<LedgerMessage>) -> Self {
        Self { ledger, mailbox }
    }

    /// Run until shutdown or until every handle is dropped
    pub fn run(mut self) {
        while let Some(msg) = self.mailbox.blocking_recv() {
            match msg {
                LedgerMessage::Shutdown => break,
                msg => self.handle_message(msg),
            }
        }

        tracing::info!(checkpoint = self.ledger.checkpoint(), "Ledger writer stopped");
    }

    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Submit { entry, response } => {
                let entry_id = entry.id.clone();
                let result = self.ledger.submit(entry);
                if let Err(e) = &result {
                    tracing::error!(entry_id = %entry_id, error = %e, "Submit failed");
                }
                let _ = response.send(result);
            }

            LedgerMessage::Recover { response } => {
                let result = self.ledger.recover();
                if let Err(e) = &result {
                    tracing::error!(error = %e, "Recovery failed");
                }
                let _ = response.send(result);
            }

            LedgerMessage::ProvisionAccount {
                account,
                balance,
                response,
            } => {
                let _ = response.send(self.ledger.provision_account(account, balance));
            }

            LedgerMessage::GetBalance { account, response } => {
                let _ = response.send(self.ledger.balance(&account));
            }

            LedgerMessage::GetBalances { response } => {
                let _ = response.send(self.ledger.balances().clone());
            }

            LedgerMessage::GetCheckpoint { response } => {
                let _ = response.send(self.ledger.checkpoint());
            }

            LedgerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Ledger mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Append an entry and run a full cycle
    pub async fn submit(&self, entry: LedgerEntry) -> Result<SubmitReceipt> {
        self.request(|response| LedgerMessage::Submit { entry, response })
            .await?
    }

    /// Run a recovery cycle
    pub async fn recover(&self) -> Result<CycleReport> {
        self.request(|response| LedgerMessage::Recover { response })
            .await?
    }

    /// Provision a new account
    pub async fn provision_account(&self, account: AccountId, balance: u64) -> Result<()> {
        self.request(|response| LedgerMessage::ProvisionAccount {
            account,
            balance,
            response,
        })
        .await?
    }

    /// Get one balance
    pub async fn balance(&self, account: AccountId) -> Result<Option<u64>> {
        self.request(|response| LedgerMessage::GetBalance { account, response })
            .await
    }

    /// Get all balances
    pub async fn balances(&self) -> Result<LedgerState> {
        self.request(|response| LedgerMessage::GetBalances { response })
            .await
    }

    /// Get the committed checkpoint
    pub async fn checkpoint(&self) -> Result<Lsn> {
        self.request(|response| LedgerMessage::GetCheckpoint { response })
            .await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Ledger mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Move `ledger` onto a dedicated writer thread
pub fn spawn_ledger_actor(ledger: Ledger) -> Result<LedgerHandle> {
    let capacity = ledger.config().actor.mailbox_capacity;
    let (tx, rx) = mpsc::channel(capacity); // Bounded channel for backpressure
    let actor = LedgerActor::new(ledger, rx);

    thread::Builder::new()
        .name("ledger-writer".to_string())
        .spawn(move || actor.run())?;

    Ok(LedgerHandle::new(tx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{snapshot::SnapshotStore, Config, EntryOutcome};
    use tempfile::TempDir;

    fn open_ledger(dir: &TempDir) -> Ledger {
        let config = Config::with_data_dir(dir.path()).with_accounts(["bos", "pune"]);
        let snapshots = SnapshotStore::new(&config.storage.snapshot_dir);
        snapshots.provision(&"bos".into(), 100, 0).unwrap();
        snapshots.provision(&"pune".into(), 100, 0).unwrap();
        Ledger::open(config).unwrap()
    }

    #[tokio::test]
    async fn test_actor_spawn_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_ledger_actor(open_ledger(&dir)).unwrap();

        assert_eq!(handle.checkpoint().await.unwrap(), 0);
        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_actor_submit() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_ledger_actor(open_ledger(&dir)).unwrap();

        let receipt = handle
            .submit(LedgerEntry::new("t1", "bos", "pune", 30))
            .await
            .unwrap();
        assert_eq!(receipt.outcome, EntryOutcome::Applied);

        assert_eq!(handle.balance("bos".into()).await.unwrap(), Some(70));
        assert_eq!(handle.checkpoint().await.unwrap(), receipt.lsn);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_submissions_are_serialized() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_ledger_actor(open_ledger(&dir)).unwrap();

        let mut tasks = Vec::new();
        for i in 0..20u64 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                let (from, to) = if i % 2 == 0 { ("bos", "pune") } else { ("pune", "bos") };
                handle
                    .submit(LedgerEntry::new(format!("t{i}"), from, to, i + 1))
                    .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let balances = handle.balances().await.unwrap();
        assert_eq!(balances.total(), 200);

        let log_len = std::fs::metadata(dir.path().join("wal.log")).unwrap().len();
        assert_eq!(handle.checkpoint().await.unwrap(), log_len);

        handle.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_requests_after_shutdown_fail() {
        let dir = TempDir::new().unwrap();
        let handle = spawn_ledger_actor(open_ledger(&dir)).unwrap();
        handle.shutdown().await.unwrap();

        let err = handle.checkpoint().await.unwrap_err();
        assert!(matches!(err, Error::Concurrency(_)));
    }
}
