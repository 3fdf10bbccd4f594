//! Log replay
//!
//! Folds the log bytes after a checkpoint into [`LedgerState`].
//!
//! # Record handling
//!
//! - **Torn / malformed record**: replay stops; its bytes are not counted.
//!   This is how an interrupted write shows up after a crash, so it is not
//!   an error.
//! - **Unknown account**: replay fails with [`Error::UnknownAccount`]. The
//!   state keeps every entry applied before the offending one.
//! - **Insufficient funds**: counted toward the LSN, not applied.
//! - **Otherwise**: source debited, destination credited.
//!
//! Replay is deterministic: the same base state and byte range always give
//! the same ending state and LSN.

use crate::{
    state::LedgerState,
    types::{EntryOutcome, LedgerEntry, LogPosition, Lsn},
    Error, Result,
};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Outcome for a single replayed record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    /// Transaction id
    pub entry_id: String,
    /// Where the record lives in the log
    pub position: LogPosition,
    /// Whether it moved value
    pub outcome: EntryOutcome,
}

/// Summary of one replay pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayReport {
    /// Offset replay started from
    pub start_lsn: Lsn,
    /// Offset just past the last consumed record
    pub end_lsn: Lsn,
    /// Consumed records in log order
    pub entries: Vec<EntryReport>,
    /// Replay stopped at an incomplete or unparsable record
    pub torn_tail: bool,
}

impl ReplayReport {
    fn empty(start_lsn: Lsn) -> Self {
        Self {
            start_lsn,
            end_lsn: start_lsn,
            entries: Vec::new(),
            torn_tail: false,
        }
    }

    /// Bytes consumed by this pass
    pub fn bytes_consumed(&self) -> u64 {
        self.end_lsn - self.start_lsn
    }

    /// Number of entries that moved value
    pub fn applied(&self) -> usize {
        self.count(EntryOutcome::Applied)
    }

    /// Number of entries skipped for insufficient funds
    pub fn rejected(&self) -> usize {
        self.count(EntryOutcome::InsufficientFunds)
    }

    fn count(&self, outcome: EntryOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    /// Outcome of the last record consumed with this transaction id
    pub fn outcome_of(&self, entry_id: &str) -> Option<EntryOutcome> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.entry_id == entry_id)
            .map(|e| e.outcome)
    }
}

/// Reads the log from a checkpoint forward
#[derive(Debug, Clone)]
pub struct Replayer {
    log_path: PathBuf,
}

impl Replayer {
    /// Create a replayer over the log at `log_path`
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    /// Path of the log being replayed
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Apply every complete record after `start` to `state`
    pub fn replay(&self, start: Lsn, state: &mut LedgerState) -> Result<ReplayReport> {
        let mut file = match File::open(&self.log_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound && start == 0 => {
                return Ok(ReplayReport::empty(start));
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::InvariantViolation(format!(
                    "checkpoint at lsn {} but log {} is missing",
                    start,
                    self.log_path.display()
                )));
            }
            Err(e) => return Err(e.into()),
        };

        check_start(&mut file, start)?;
        file.seek(SeekFrom::Start(start))?;

        let mut reader = BufReader::new(file);
        let mut report = ReplayReport::empty(start);
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line)?;
            if read == 0 {
                break;
            }

            let lsn = report.end_lsn;
            if line.last() != Some(&b'\n') {
                tracing::warn!(lsn, bytes = read, "Stopping replay at unterminated record");
                report.torn_tail = true;
                break;
            }

            let entry: LedgerEntry = match serde_json::from_slice(&line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(lsn, error = %e, "Stopping replay at malformed record");
                    report.torn_tail = true;
                    break;
                }
            };

            let outcome = state.apply(&entry, lsn)?;
            match outcome {
                EntryOutcome::Applied => tracing::debug!(
                    entry_id = %entry.id,
                    lsn,
                    amount = entry.amount,
                    "Entry applied"
                ),
                EntryOutcome::InsufficientFunds => tracing::warn!(
                    entry_id = %entry.id,
                    lsn,
                    source = %entry.source_account,
                    amount = entry.amount,
                    "Entry skipped: insufficient funds"
                ),
            }

            let position = LogPosition {
                offset: lsn,
                len: read as u64,
            };
            report.end_lsn = position.end();
            report.entries.push(EntryReport {
                entry_id: entry.id,
                position,
                outcome,
            });
        }

        tracing::debug!(
            start_lsn = report.start_lsn,
            end_lsn = report.end_lsn,
            applied = report.applied(),
            rejected = report.rejected(),
            torn_tail = report.torn_tail,
            "Replay finished"
        );

        Ok(report)
    }
}

/// `start` must be within the log and on a record boundary
fn check_start(file: &mut File, start: Lsn) -> Result<()> {
    let len = file.metadata()?.len();
    if start > len {
        return Err(Error::InvariantViolation(format!(
            "lsn {} is past the end of the log ({} bytes)",
            start, len
        )));
    }
    if start == 0 {
        return Ok(());
    }

    let mut previous = [0u8; 1];
    file.seek(SeekFrom::Start(start - 1))?;
    file.read_exact(&mut previous)?;
    if previous[0] != b'\n' {
        return Err(Error::InvariantViolation(format!(
            "lsn {} is not on a record boundary",
            start
        )));
    }
    Ok(())
}
