//! Write-ahead log
//!
//! JSON Lines file, one [`LedgerEntry`] per line. Records are only ever
//! appended; an append returns once the record has been fsynced.

use crate::{
    storage,
    types::{LedgerEntry, LogPosition, Lsn},
    Result,
};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Backward scan window used when looking for the last complete record
const TAIL_SCAN_CHUNK: u64 = 4096;

/// Append-only writer for the operation log
#[derive(Debug)]
pub struct WalWriter {
    path: PathBuf,
    file: File,
    len: u64,
}

impl WalWriter {
    /// Open or create the log at `path`
    ///
    /// An unterminated trailing record can only come from a write that was
    /// interrupted before its fsync returned, so it was never acknowledged.
    /// It is cut back to the last newline; otherwise the next append would
    /// be glued onto the torn bytes.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        storage::ensure_parent(&path)?;
        let existed = path.exists();

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)?;
        if !existed {
            storage::sync_dir(storage::parent_dir(&path))?;
        }

        let len = file.metadata()?.len();
        let record_end = last_record_end(&mut file, len)?;
        if record_end < len {
            tracing::warn!(
                path = %path.display(),
                torn_bytes = len - record_end,
                "Truncating torn tail of write-ahead log"
            );
            file.set_len(record_end)?;
            file.sync_all()?;
        }

        tracing::debug!(path = %path.display(), len = record_end, "Write-ahead log opened");

        Ok(Self {
            path,
            file,
            len: record_end,
        })
    }

    /// Append an entry and fsync it
    pub fn append(&mut self, entry: &LedgerEntry) -> Result<LogPosition> {
        let record = entry.to_record()?;

        if let Err(e) = self.write_durable(&record) {
            // Nothing past `len` was acknowledged; drop whatever made it out.
            if let Err(truncate_err) = self.file.set_len(self.len) {
                tracing::error!(error = %truncate_err, "Failed to roll back partial append");
            }
            return Err(e);
        }

        let position = LogPosition {
            offset: self.len,
            len: record.len() as u64,
        };
        self.len = position.end();

        tracing::debug!(
            entry_id = %entry.id,
            offset = position.offset,
            len = position.len,
            "Entry appended"
        );

        Ok(position)
    }

    fn write_durable(&mut self, record: &[u8]) -> Result<()> {
        self.file.write_all(record)?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Current log size in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// True if nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Offset just past the last newline in the first `len` bytes
fn last_record_end(file: &mut File, len: u64) -> Result<Lsn> {
    let mut buf = vec![0u8; TAIL_SCAN_CHUNK as usize];
    let mut end = len;

    while end > 0 {
        let start = end.saturating_sub(TAIL_SCAN_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;

        if let Some(pos) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(start + pos as u64 + 1);
        }
        end = start;
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(id: &str, amount: u64) -> LedgerEntry {
        LedgerEntry::new(id, "bos", "pune", amount)
    }

    #[test]
    fn test_open_creates_empty_log() {
        let dir = TempDir::new().unwrap();
        let wal = WalWriter::open(dir.path().join("nested/wal.log")).unwrap();
        assert!(wal.is_empty());
        assert!(wal.path().exists());
    }

    #[test]
    fn test_append_positions_are_contiguous() {
        let dir = TempDir::new().unwrap();
        let mut wal = WalWriter::open(dir.path().join("wal.log")).unwrap();

        let first = wal.append(&entry("t1", 3)).unwrap();
        let second = wal.append(&entry("t2", 4)).unwrap();

        assert_eq!(first.offset, 0);
        assert_eq!(second.offset, first.end());
        assert_eq!(wal.len(), second.end());
        assert_eq!(fs::metadata(wal.path()).unwrap().len(), wal.len());
    }

    #[test]
    fn test_reopen_keeps_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");

        let len = {
            let mut wal = WalWriter::open(&path).unwrap();
            wal.append(&entry("t1", 3)).unwrap();
            wal.len()
        };

        let wal = WalWriter::open(&path).unwrap();
        assert_eq!(wal.len(), len);
    }

    #[test]
    fn test_open_truncates_torn_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");

        let good = entry("t1", 3).to_record().unwrap();
        let torn = entry("t2", 4).to_record().unwrap();
        let mut bytes = good.clone();
        bytes.extend_from_slice(&torn[..torn.len() / 2]);
        fs::write(&path, &bytes).unwrap();

        let mut wal = WalWriter::open(&path).unwrap();
        assert_eq!(wal.len(), good.len() as u64);

        wal.append(&entry("t3", 5)).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in lines {
            serde_json::from_str::<LedgerEntry>(line).unwrap();
        }
    }

    #[test]
    fn test_open_truncates_log_without_any_newline() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        fs::write(&path, b"{\"id\":\"t1\",\"sou").unwrap();

        let wal = WalWriter::open(&path).unwrap();
        assert!(wal.is_empty());
    }

    #[test]
    fn test_tail_scan_crosses_chunk_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");

        let mut wal = WalWriter::open(&path).unwrap();
        let long_id = "x".repeat(TAIL_SCAN_CHUNK as usize * 2);
        wal.append(&entry(&long_id, 1)).unwrap();
        let len = wal.len();
        drop(wal);

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all("y".repeat(TAIL_SCAN_CHUNK as usize + 10).as_bytes())
            .unwrap();

        let wal = WalWriter::open(&path).unwrap();
        assert_eq!(wal.len(), len);
    }

    #[test]
    fn test_failed_append_leaves_length_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wal.log");
        let mut wal = WalWriter::open(&path).unwrap();
        let first = wal.append(&entry("t1", 3)).unwrap();

        // A read-only handle makes the next write fail.
        wal.file = File::open(&path).unwrap();
        assert!(wal.append(&entry("t2", 4)).is_err());

        assert_eq!(wal.len(), first.end());
        assert_eq!(fs::metadata(&path).unwrap().len(), first.end());
    }
}
