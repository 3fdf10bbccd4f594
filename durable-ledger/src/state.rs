//! In-memory ledger state
//!
//! Account balances keyed by [`AccountId`]. Populated from snapshots at
//! bootstrap; mutated only through [`LedgerState::apply`] during replay.

use crate::{
    types::{AccountId, EntryOutcome, LedgerEntry, Lsn},
    Error, Result,
};
use std::collections::BTreeMap;

/// Account balance table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    balances: BTreeMap<AccountId, u64>,
}

impl LedgerState {
    /// Empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a state from `(account, balance)` pairs
    pub fn from_balances<I, A>(balances: I) -> Result<Self>
    where
        I: IntoIterator<Item = (A, u64)>,
        A: Into<AccountId>,
    {
        let mut state = Self::new();
        for (account, balance) in balances {
            state.open_account(account.into(), balance)?;
        }
        Ok(state)
    }

    /// Add a provisioned account
    pub fn open_account(&mut self, account: AccountId, balance: u64) -> Result<()> {
        if self.balances.contains_key(&account) {
            return Err(Error::AccountExists(account));
        }
        self.balances.insert(account, balance);
        Ok(())
    }

    /// Fold one entry into the table
    ///
    /// `lsn` is the offset of the entry's record and is only used to report
    /// an unknown account. Nothing is mutated unless the result is
    /// [`EntryOutcome::Applied`].
    pub(crate) fn apply(&mut self, entry: &LedgerEntry, lsn: Lsn) -> Result<EntryOutcome> {
        let source_balance = self.require(&entry.source_account, entry, lsn)?;
        let destination_balance = self.require(&entry.destination_account, entry, lsn)?;

        if source_balance < entry.amount {
            return Ok(EntryOutcome::InsufficientFunds);
        }
        if entry.source_account == entry.destination_account {
            return Ok(EntryOutcome::Applied);
        }

        let credited = destination_balance.checked_add(entry.amount).ok_or_else(|| {
            Error::InvariantViolation(format!(
                "crediting {} to {} overflows",
                entry.amount, entry.destination_account
            ))
        })?;

        self.balances
            .insert(entry.source_account.clone(), source_balance - entry.amount);
        self.balances
            .insert(entry.destination_account.clone(), credited);

        Ok(EntryOutcome::Applied)
    }

    fn require(&self, account: &AccountId, entry: &LedgerEntry, lsn: Lsn) -> Result<u64> {
        self.balances
            .get(account)
            .copied()
            .ok_or_else(|| Error::UnknownAccount {
                account: account.clone(),
                entry_id: entry.id.clone(),
                lsn,
            })
    }

    /// Balance of `account`, if provisioned
    pub fn balance(&self, account: &AccountId) -> Option<u64> {
        self.balances.get(account).copied()
    }

    /// Whether `account` is provisioned
    pub fn contains(&self, account: &AccountId) -> bool {
        self.balances.contains_key(account)
    }

    /// Sum of all balances
    pub fn total(&self) -> u128 {
        self.balances.values().map(|b| u128::from(*b)).sum()
    }

    /// Number of accounts
    pub fn len(&self) -> usize {
        self.balances.len()
    }

    /// True if no accounts are provisioned
    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    /// Accounts and balances in account order
    pub fn iter(&self) -> impl Iterator<Item = (&AccountId, u64)> + '_ {
        self.balances.iter().map(|(account, balance)| (account, *balance))
    }
}
