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

//! The ledger store contract.
//!
//! A store owns user balances and ledger entries and exposes a single
//! mutation, [`LedgerStore::atomic_apply`]. Everything the processor reads
//! outside that call is advisory: the store re-reads and re-validates inside
//! its own exclusive section.

use crate::base::{Direction, ExternalId, SourceType, UserId};
use crate::entry::LedgerEntry;
use crate::error::StoreError;
use crate::money::Money;
use crate::user::User;
use std::sync::Arc;

/// A relative balance mutation, applied against whatever balance the store
/// holds at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    pub user_id: UserId,
    pub external_id: ExternalId,
    pub direction: Direction,
    pub amount: Money,
    pub source_type: SourceType,
}

/// Result of a committed [`BalanceChange`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub entry: LedgerEntry,
    /// Balance immediately after this entry was applied.
    pub balance: Money,
}

/// Durable keyed storage for balances and ledger entries.
pub trait LedgerStore: Send + Sync {
    /// Reads a user's current balance row.
    fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    /// Looks up the entry recorded under `external_id`, if any.
    fn entry_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<LedgerEntry>, StoreError>;

    /// Applies `change` as one indivisible unit.
    ///
    /// Implementations must hold exclusive access to the user's balance for
    /// the whole call, recompute the new balance from the value present
    /// there, and either record both the entry and the new balance or
    /// neither.
    ///
    /// # Errors
    ///
    /// - [`StoreError::DuplicateExternalId`] - the external id is already recorded.
    /// - [`StoreError::InsufficientFunds`] - a debit exceeds the committed balance.
    /// - [`StoreError::UserNotFound`] - no such user at commit time.
    /// - Any other variant is an infrastructure failure.
    fn atomic_apply(&self, change: BalanceChange) -> Result<Committed, StoreError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        (**self).user(user_id)
    }

    fn entry_by_external_id(
        &self,
        external_id: &ExternalId,
    ) -> Result<Option<LedgerEntry>, StoreError> {
        (**self).entry_by_external_id(external_id)
    }

    fn atomic_apply(&self, change: BalanceChange) -> Result<Committed, StoreError> {
        (**self).atomic_apply(change)
    }
}
