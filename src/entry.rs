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

//! Ledger entries: the immutable record of one applied event.

use crate::base::{Direction, EntryId, ExternalId, SourceType, UserId};
use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed win/lose event.
///
/// Created exactly once per distinct [`ExternalId`], inside the same atomic
/// section that moves the owner's balance, and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub external_id: ExternalId,
    pub source_type: SourceType,
    pub direction: Direction,
    /// Always positive.
    pub amount: Money,
    pub processed_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Applies this entry to `balance`.
    ///
    /// Returns `None` when a debit exceeds `balance` or a credit overflows.
    pub fn apply_to(&self, balance: Money) -> Option<Money> {
        self.direction.apply(balance, self.amount)
    }
}

impl Direction {
    /// Moves `balance` by `amount` in this direction.
    ///
    /// `None` means the move is not allowed: a `lose` larger than the balance,
    /// or a `win` past the representable range.
    pub fn apply(&self, balance: Money, amount: Money) -> Option<Money> {
        match self {
            Direction::Win => balance.checked_add(amount),
            Direction::Lose => balance.checked_sub(amount),
        }
    }
}
