// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-process ledger store.
//!
//! Every user owns a row guarded by its own [`Mutex`]; rows live in a
//! [`DashMap`] so requests for different users never contend. Ledger entries
//! are indexed globally by [`ExternalId`], and that index is the
//! authoritative idempotency guard: a key is claimed with the entry API while
//! the owner's row lock is held, so check-and-insert cannot race.
//!
//! Lock order inside [`MemoryStore::atomic_apply`] is always
//! user row → external-id shard → journal. No path acquires them in any
//! other order.
//!
//! # Example
//!
//! ```
//! use balance_ledger::{
//!     BalanceChange, Direction, ExternalId, LedgerStore, MemoryStore, Money, SourceType,
//!     StoreConfig, UserId,
//! };
//!
//! let store = MemoryStore::new(StoreConfig::default());
//! store.ensure_user(UserId(1)).unwrap();
//!
//! let committed = store
//!     .atomic_apply(BalanceChange {
//!         user_id: UserId(1),
//!         external_id: ExternalId::new("t1").unwrap(),
//!         direction: Direction::Win,
//!         amount: Money::parse("10.50").unwrap(),
//!         source_type: SourceType::Game,
//!     })
//!     .unwrap();
//! assert_eq!(committed.balance.to_string(), "10.50");
//! ```

use crate::base::{Direction, EntryId, ExternalId, UserId};
use crate::config::StoreConfig;
use crate::entry::LedgerEntry;
use crate::error::StoreError;
use crate::journal::{Journal, JournalReader, JournalRecord};
use crate::money::Money;
use crate::store::{BalanceChange, Committed, LedgerStore};
use crate::user::User;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::{Mutex, MutexGuard};
use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
struct UserState {
    id: UserId,
    balance: Money,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Entries in commit order.
    history: Vec<Arc<LedgerEntry>>,
}

impl UserState {
    fn new(id: UserId, balance: Money, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            balance,
            created_at,
            updated_at: created_at,
            history: Vec::new(),
        }
    }

    fn snapshot(&self) -> User {
        User {
            id: self.id,
            balance: self.balance,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance.is_non_negative(),
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.history
                .iter()
                .all(|entry| entry.user_id == self.id && entry.amount.is_positive()),
            "Invariant violated: foreign or non-positive entry in history of user {}",
            self.id
        );
    }
}

#[derive(Debug)]
struct UserRow {
    state: Mutex<UserState>,
}

/// Ledger store backed by process memory and an optional [`Journal`].
#[derive(Debug)]
pub struct MemoryStore {
    config: StoreConfig,
    users: DashMap<UserId, Arc<UserRow>>,
    /// Global idempotency index.
    entries: DashMap<ExternalId, Arc<LedgerEntry>>,
    next_entry_id: AtomicU64,
    journal: Option<Journal>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

impl MemoryStore {
    /// Creates an empty store with no journal.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            users: DashMap::new(),
            entries: DashMap::new(),
            next_entry_id: AtomicU64::new(1),
            journal: None,
        }
    }

    /// Sends every subsequent mutation to `writer` before it takes effect.
    pub fn with_journal<W: Write + Send + 'static>(mut self, writer: W) -> Self {
        self.journal = Some(Journal::new(writer));
        self
    }

    /// Rebuilds a store by replaying a journal.
    ///
    /// Each entry is re-applied with the same win/lose rule used at commit
    /// time, and the resulting balance must match the one recorded. A torn
    /// tail is ignored here but stays in the medium; use [`MemoryStore::open`]
    /// to keep appending to a journal file.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Corrupt`] - the journal contradicts itself or holds an
    ///   unreadable record.
    /// - [`StoreError::Journal`] - the reader failed.
    pub fn recover<R: BufRead>(config: StoreConfig, reader: R) -> Result<Self, StoreError> {
        Self::replay(config, &mut JournalReader::new(reader))
    }

    /// Recovers from the journal file at `path` and keeps appending to it.
    ///
    /// The file is created if missing. A torn tail left by an interrupted
    /// write is cut off before the first append, so new records always start
    /// on a fresh line.
    pub fn open(config: StoreConfig, path: &Path) -> Result<Self, StoreError> {
        let io_err = |e: io::Error| StoreError::Journal(format!("{}: {e}", path.display()));

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)
            .map_err(io_err)?;
        let mut records = JournalReader::new(BufReader::new(&file));
        let store = Self::replay(config, &mut records)?;

        let intact = records.intact_len();
        drop(records);
        let len = file.metadata().map_err(io_err)?.len();
        if len > intact {
            tracing::warn!(
                path = %path.display(),
                dropped = len - intact,
                "truncating torn journal tail"
            );
            file.set_len(intact).map_err(io_err)?;
        }
        Ok(store.with_journal(BufWriter::new(file)))
    }

    fn replay<R: BufRead>(
        config: StoreConfig,
        records: &mut JournalReader<R>,
    ) -> Result<Self, StoreError> {
        let store = Self::new(config);
        let mut replayed = 0usize;

        for record in records {
            match record? {
                JournalRecord::UserCreated {
                    user_id,
                    balance,
                    at,
                } => match store.users.entry(user_id) {
                    Entry::Occupied(_) => {
                        return Err(StoreError::Corrupt(format!(
                            "user {user_id} created twice"
                        )));
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(UserRow {
                            state: Mutex::new(UserState::new(user_id, balance, at)),
                        }));
                    }
                },
                JournalRecord::EntryCommitted { entry, balance } => {
                    store.replay_entry(entry, balance)?;
                }
            }
            replayed += 1;
        }

        tracing::info!(
            records = replayed,
            users = store.users.len(),
            entries = store.entries.len(),
            "ledger recovered from journal"
        );
        Ok(store)
    }

    fn replay_entry(&self, entry: LedgerEntry, recorded: Money) -> Result<(), StoreError> {
        let row = self.row(entry.user_id).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "entry {} references unknown user {}",
                entry.external_id, entry.user_id
            ))
        })?;
        let mut state = self.lock_row(&row, entry.user_id)?;

        let Entry::Vacant(slot) = self.entries.entry(entry.external_id.clone()) else {
            return Err(StoreError::Corrupt(format!(
                "external id {} committed twice",
                entry.external_id
            )));
        };
        match entry.apply_to(state.balance) {
            Some(balance) if balance == recorded => {}
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "entry {} does not reproduce recorded balance {recorded} from {}",
                    entry.external_id, state.balance
                )));
            }
        }

        self.next_entry_id
            .fetch_max(entry.id.0.saturating_add(1), Ordering::SeqCst);
        let entry = Arc::new(entry);
        slot.insert(Arc::clone(&entry));
        state.balance = recorded;
        state.updated_at = entry.processed_at;
        state.history.push(entry);
        state.assert_invariants();
        Ok(())
    }

    /// Provisions a user with an opening balance.
    ///
    /// # Errors
    ///
    /// - [`StoreError::InvalidUserId`] for id 0.
    /// - [`StoreError::DuplicateUser`] if the id is taken.
    pub fn create_user(&self, user_id: UserId, balance: Money) -> Result<User, StoreError> {
        if !user_id.is_valid() {
            return Err(StoreError::InvalidUserId(user_id));
        }
        match self.users.entry(user_id) {
            Entry::Occupied(_) => Err(StoreError::DuplicateUser(user_id)),
            Entry::Vacant(slot) => {
                let at = Utc::now();
                if let Some(journal) = &self.journal {
                    journal.append(&JournalRecord::UserCreated {
                        user_id,
                        balance,
                        at,
                    })?;
                }
                let state = UserState::new(user_id, balance, at);
                let user = state.snapshot();
                slot.insert(Arc::new(UserRow {
                    state: Mutex::new(state),
                }));
                tracing::info!(%user_id, %balance, "user provisioned");
                Ok(user)
            }
        }
    }

    /// Provisions `user_id` at zero balance unless it already exists.
    pub fn ensure_user(&self, user_id: UserId) -> Result<User, StoreError> {
        match self.create_user(user_id, Money::ZERO) {
            Err(StoreError::DuplicateUser(_)) => self
                .user(user_id)?
                .ok_or(StoreError::UserNotFound(user_id)),
            other => other,
        }
    }

    /// Entries of `user_id` in the order they were committed.
    pub fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>, StoreError> {
        let row = self.row(user_id).ok_or(StoreError::UserNotFound(user_id))?;
        let state = self.lock_row(&row, user_id)?;
        Ok(state.history.iter().map(|entry| (**entry).clone()).collect())
    }

    /// Number of committed entries across all users.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// All provisioned user ids, ascending.
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.users.iter().map(|row| *row.key()).collect();
        ids.sort_unstable();
        ids
    }

    /// Whether the journal has refused writes since an earlier failure.
    pub fn journal_poisoned(&self) -> bool {
        self.journal.as_ref().is_some_and(Journal::is_poisoned)
    }

    /// Clones the row handle so the map shard is released before locking.
    fn row(&self, user_id: UserId) -> Option<Arc<UserRow>> {
        self.users.get(&user_id).map(|row| Arc::clone(row.value()))
    }

    fn lock_row<'a>(
        &self,
        row: &'a UserRow,
        user_id: UserId,
    ) -> Result<MutexGuard<'a, UserState>, StoreError> {
        row.state
            .try_lock_for(self.config.lock_timeout)
            .ok_or(StoreError::LockTimeout(user_id))
    }
}

impl LedgerStore for MemoryStore {
    fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let Some(row) = self.row(user_id) else {
            return Ok(None);
        };
        let state = self.lock_row(&row, user_id)?;
        Ok(Some(state.snapshot()))
    }

    fn entry_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .entries
            .get(external_id)
            .map(|entry| (**entry.value()).clone()))
    }

    fn atomic_apply(&self, change: BalanceChange) -> Result<Committed, StoreError> {
        let BalanceChange {
            user_id,
            external_id,
            direction,
            amount,
            source_type,
        } = change;
        debug_assert!(amount.is_positive(), "non-positive amount reached the store");

        let row = self.row(user_id).ok_or(StoreError::UserNotFound(user_id))?;
        let mut state = self.lock_row(&row, user_id)?;

        // Claim the key. The shard stays write-locked until the slot is
        // filled or dropped, so a concurrent duplicate waits here and then
        // sees Occupied.
        let slot = match self.entries.entry(external_id) {
            Entry::Occupied(existing) => {
                return Err(StoreError::DuplicateExternalId(existing.key().clone()));
            }
            Entry::Vacant(slot) => slot,
        };

        // Recompute from the balance present now, not from any earlier read.
        let balance = direction
            .apply(state.balance, amount)
            .ok_or_else(|| match direction {
                Direction::Win => StoreError::Overflow(user_id),
                Direction::Lose => StoreError::InsufficientFunds {
                    user_id,
                    balance: state.balance,
                    requested: amount,
                },
            })?;

        let entry = LedgerEntry {
            id: EntryId(self.next_entry_id.fetch_add(1, Ordering::SeqCst)),
            user_id,
            external_id: slot.key().clone(),
            source_type,
            direction,
            amount,
            processed_at: Utc::now(),
        };

        // Last fallible step. Nothing below can fail, so a journal error
        // leaves both the index and the balance untouched.
        if let Some(journal) = &self.journal {
            journal.append(&JournalRecord::EntryCommitted {
                entry: entry.clone(),
                balance,
            })?;
        }

        let shared = Arc::new(entry.clone());
        slot.insert(Arc::clone(&shared));
        state.balance = balance;
        state.updated_at = entry.processed_at;
        state.history.push(shared);
        state.assert_invariants();

        tracing::debug!(
            %user_id,
            external_id = %entry.external_id,
            %direction,
            %amount,
            %balance,
            "ledger entry committed"
        );
        Ok(Committed { entry, balance })
    }
}
