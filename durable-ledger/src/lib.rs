//! Durable Ledger Core
//!
//! Append-only operation log with a byte-offset checkpoint, per-account
//! snapshots and a deterministic recovery protocol.
//!
//! # Architecture
//!
//! - **Write-Ahead Log**: every transfer is durably appended before it is acknowledged
//! - **Replay**: unapplied log bytes are folded into the in-memory balance table
//! - **Snapshots**: one file per account, rewritten each cycle
//! - **Checkpoint**: the LSN is committed only after the snapshots are durable
//! - **Single Writer**: one owner drives the whole append/replay/snapshot/commit cycle
//!
//! # Invariants
//!
//! - Value conservation: a transfer moves value, never creates or destroys it
//! - Deterministic replay: same base state + same log bytes → same state
//! - Append-only: acknowledged records are never modified or deleted
//! - Checkpoint monotonicity: the committed LSN never decreases

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod types;
pub mod storage;
pub mod wal;
pub mod checkpoint;
pub mod state;
pub mod replay;
pub mod snapshot;
pub mod ledger;
pub mod error;
pub mod actor;
pub mod config;
pub mod metrics;

// Re-exports
pub use error::{Error, Result};
pub use types::{
    AccountId, AccountSnapshot, CheckpointMarker, EntryOutcome, LedgerEntry, LogPosition, Lsn,
};
pub use state::LedgerState;
pub use wal::WalWriter;
pub use checkpoint::CheckpointStore;
pub use replay::{ReplayReport, Replayer};
pub use snapshot::SnapshotStore;
pub use ledger::{CycleReport, Ledger, SubmitReceipt};
pub use actor::{spawn_ledger_actor, LedgerHandle};
pub use config::Config;
