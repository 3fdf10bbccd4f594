//! Property-based tests for ledger invariants
//!
//! These tests use proptest to verify:
//! - Value conservation: transfers never create or destroy value
//! - Deterministic replay: same base + same bytes → same state and LSN
//! - Split replay: replaying in two passes equals one pass
//! - Idempotency: replaying with no new bytes changes nothing

use chrono::{TimeZone, Utc};
use durable_ledger::{
    AccountId, Config, EntryOutcome, Ledger, LedgerEntry, LedgerState, Replayer, SnapshotStore,
    WalWriter,
};
use proptest::prelude::*;
use tempfile::TempDir;

const ACCOUNTS: [&str; 4] = ["bos", "pune", "london", "tokyo"];

/// Strategy for picking an account
fn account_strategy() -> impl Strategy<Value = &'static str> {
    prop::sample::select(ACCOUNTS.to_vec())
}

/// Strategy for opening balances, one per account
fn balances_strategy() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(0u64..1_000, ACCOUNTS.len())
}

/// Strategy for transfers; amounts sometimes exceed any balance
fn entries_strategy(max: usize) -> impl Strategy<Value = Vec<LedgerEntry>> {
    prop::collection::vec(
        (account_strategy(), account_strategy(), 0u64..1_500),
        1..max,
    )
    .prop_map(|transfers| {
        transfers
            .into_iter()
            .enumerate()
            .map(|(i, (source, destination, amount))| LedgerEntry {
                id: format!("t{i}"),
                source_account: AccountId::new(source),
                destination_account: AccountId::new(destination),
                amount,
                created_at: Utc.with_ymd_and_hms(2026, 1, 15, 9, 30, 0).unwrap(),
            })
            .collect()
    })
}

fn base_state(balances: &[u64]) -> LedgerState {
    LedgerState::from_balances(ACCOUNTS.iter().copied().zip(balances.iter().copied())).unwrap()
}

/// Log containing `entries`, with the end offset of every record
fn write_log(dir: &TempDir, entries: &[LedgerEntry]) -> (Replayer, Vec<u64>) {
    let path = dir.path().join("wal.log");
    let mut wal = WalWriter::open(&path).unwrap();
    let ends = entries
        .iter()
        .map(|e| wal.append(e).unwrap().end())
        .collect();
    (Replayer::new(path), ends)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: every submitted transfer conserves value
    #[test]
    fn prop_submit_conserves_value(
        balances in balances_strategy(),
        entries in entries_strategy(12),
    ) {
        let dir = TempDir::new().unwrap();
        let config = Config::with_data_dir(dir.path()).with_accounts(ACCOUNTS);
        let snapshots = SnapshotStore::new(&config.storage.snapshot_dir);
        for (account, balance) in ACCOUNTS.iter().zip(&balances) {
            snapshots.provision(&AccountId::new(*account), *balance, 0).unwrap();
        }

        let mut ledger = Ledger::open(config).unwrap();
        let total = ledger.balances().total();

        for entry in entries {
            let before = ledger.balances().clone();
            let source = entry.source_account.clone();
            let destination = entry.destination_account.clone();
            let amount = entry.amount;

            let receipt = ledger.submit(entry).unwrap();
            let after = ledger.balances();

            let pair = |state: &LedgerState| {
                let s = u128::from(state.balance(&source).unwrap());
                if source == destination {
                    s
                } else {
                    s + u128::from(state.balance(&destination).unwrap())
                }
            };
            prop_assert_eq!(pair(&before), pair(after));
            prop_assert_eq!(after.total(), total);

            match receipt.outcome {
                EntryOutcome::Applied => {
                    prop_assert!(before.balance(&source).unwrap() >= amount);
                }
                EntryOutcome::InsufficientFunds => {
                    prop_assert!(before.balance(&source).unwrap() < amount);
                    prop_assert_eq!(&before, after);
                }
            }
            prop_assert_eq!(ledger.checkpoint(), ledger.log_len());
        }
    }

    /// Property: replay is deterministic
    #[test]
    fn prop_deterministic_replay(
        balances in balances_strategy(),
        entries in entries_strategy(20),
    ) {
        let dir = TempDir::new().unwrap();
        let (replayer, ends) = write_log(&dir, &entries);

        let mut first = base_state(&balances);
        let mut second = base_state(&balances);
        let report1 = replayer.replay(0, &mut first).unwrap();
        let report2 = replayer.replay(0, &mut second).unwrap();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(report1, report2.clone());
        prop_assert_eq!(Some(&report2.end_lsn), ends.last());
        prop_assert_eq!(first.total(), base_state(&balances).total());
    }

    /// Property: replaying in two passes split at a record boundary equals one pass
    #[test]
    fn prop_split_replay_matches_single_pass(
        balances in balances_strategy(),
        entries in entries_strategy(20),
        split in any::<prop::sample::Index>(),
    ) {
        let dir = TempDir::new().unwrap();
        let (replayer, ends) = write_log(&dir, &entries);
        let boundary = ends[split.index(ends.len())];

        let mut whole = base_state(&balances);
        let single = replayer.replay(0, &mut whole).unwrap();

        // Same bytes up to the boundary, in a log of their own.
        let head_dir = TempDir::new().unwrap();
        let head_count = split.index(ends.len()) + 1;
        let (head_replayer, _) = write_log(&head_dir, &entries[..head_count]);

        let mut staged = base_state(&balances);
        let head = head_replayer.replay(0, &mut staged).unwrap();
        prop_assert_eq!(head.end_lsn, boundary);
        let tail = replayer.replay(boundary, &mut staged).unwrap();

        prop_assert_eq!(tail.end_lsn, single.end_lsn);
        prop_assert_eq!(&staged, &whole);
    }

    /// Property: replay with no new bytes is a no-op
    #[test]
    fn prop_idempotent_replay(
        balances in balances_strategy(),
        entries in entries_strategy(20),
    ) {
        let dir = TempDir::new().unwrap();
        let (replayer, _) = write_log(&dir, &entries);

        let mut state = base_state(&balances);
        let report = replayer.replay(0, &mut state).unwrap();
        let settled = state.clone();

        let again = replayer.replay(report.end_lsn, &mut state).unwrap();
        prop_assert_eq!(again.end_lsn, report.end_lsn);
        prop_assert!(again.entries.is_empty());
        prop_assert_eq!(&state, &settled);
    }
}
