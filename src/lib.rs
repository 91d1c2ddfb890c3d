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

//! # Balance Ledger
//!
//! This library applies "win"/"lose" events reported by external sources to
//! user balances, exactly once per event and without ever letting a balance
//! go negative.
//!
//! ## Core Components
//!
//! - [`Money`]: Non-negative fixed-point amount with two fractional digits
//! - [`LedgerStore`]: Storage contract with one atomic mutation
//! - [`MemoryStore`]: In-process store with per-user exclusive rows and an optional [`Journal`]
//! - [`TransactionProcessor`]: Applies the win/lose rule and classifies outcomes
//! - [`ProcessError`] / [`Outcome`]: What callers get back
//!
//! ## Example
//!
//! ```
//! use balance_ledger::{
//!     MemoryStore, Outcome, StoreConfig, TransactionProcessor, TransactionRequest, UserId,
//! };
//!
//! let store = MemoryStore::new(StoreConfig::default());
//! store.ensure_user(UserId(1)).unwrap();
//! let processor = TransactionProcessor::new(store);
//!
//! let request = TransactionRequest {
//!     user_id: 1,
//!     external_id: "t1".to_string(),
//!     direction: "win".to_string(),
//!     amount: "10.50".to_string(),
//!     source_type: "game".to_string(),
//! };
//! let outcome = processor.process(request.clone());
//! assert!(outcome.is_success());
//!
//! // Replays are safe: the second submission is a conflict and changes nothing.
//! assert!(matches!(processor.process(request), Outcome::Conflict { .. }));
//! assert_eq!(processor.get_balance(UserId(1)).unwrap().balance.to_string(), "10.50");
//! ```
//!
//! ## Thread Safety
//!
//! Requests for different users run in parallel. Requests for the same user
//! serialize inside [`LedgerStore::atomic_apply`]; the processor itself holds
//! no locks.

mod base;
pub mod config;
mod entry;
pub mod error;
pub mod journal;
mod memory;
mod money;
mod processor;
mod store;
mod user;

pub use base::{Direction, EntryId, ExternalId, SourceType, UnknownTag, UserId};
pub use config::StoreConfig;
pub use entry::LedgerEntry;
pub use error::{FormatError, ProcessError, StoreError};
pub use journal::{Journal, JournalReader, JournalRecord};
pub use memory::MemoryStore;
pub use money::Money;
pub use processor::{Outcome, TransactionProcessor, TransactionRequest};
pub use store::{BalanceChange, Committed, LedgerStore};
pub use user::User;
