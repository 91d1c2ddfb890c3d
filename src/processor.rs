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

//! Transaction processing.
//!
//! The [`TransactionProcessor`] turns a win/lose event into a committed
//! balance change, and classifies every other result into the caller-facing
//! [`ProcessError`] taxonomy.
//!
//! # Processing Steps
//!
//! 1. Reject non-positive amounts.
//! 2. Fast path: an already recorded external id is a conflict.
//! 3. Load the user; a missing user is not found.
//! 4. Check the win/lose rule against that snapshot.
//! 5. Hand the relative change to [`LedgerStore::atomic_apply`], which
//!    re-checks everything under exclusive access.
//!
//! Steps 2 to 4 only save a trip to the store. A duplicate or overdraft that
//! slips past them because of a concurrent request is caught in step 5 and
//! reported exactly as if the fast path had caught it.
//!
//! # Thread Safety
//!
//! The processor holds no state besides its store and needs no locking of its
//! own; share it freely across request handlers.

use crate::base::{Direction, ExternalId, SourceType, UserId};
use crate::error::{FormatError, ProcessError, StoreError};
use crate::money::Money;
use crate::store::{BalanceChange, Committed, LedgerStore};
use crate::user::User;
use serde::{Deserialize, Serialize};

const INSUFFICIENT_BALANCE: &str = "insufficient balance";
const INVALID_STATE: &str = "invalid transaction state";
const NOT_POSITIVE: &str = "amount must be positive";
const BALANCE_OVERFLOW: &str = "balance would exceed the supported range";

/// Normalized transport input. Every field is still unvalidated text or a
/// raw number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub user_id: u64,
    pub external_id: String,
    pub direction: String,
    pub amount: String,
    pub source_type: String,
}

impl TransactionRequest {
    /// Validates the raw fields into a [`BalanceChange`].
    ///
    /// # Errors
    ///
    /// [`ProcessError::Validation`] naming the first invalid field.
    pub fn into_change(self) -> Result<BalanceChange, ProcessError> {
        let user_id = UserId(self.user_id);
        if !user_id.is_valid() {
            return Err(ProcessError::Validation(
                "invalid user id: must be a positive integer".to_string(),
            ));
        }
        let external_id = ExternalId::new(self.external_id).ok_or_else(|| {
            ProcessError::Validation("external id must not be empty".to_string())
        })?;
        let direction: Direction = self
            .direction
            .parse()
            .map_err(|_| ProcessError::Validation(INVALID_STATE.to_string()))?;
        let source_type: SourceType = self.source_type.parse().map_err(|_| {
            ProcessError::Validation(format!(
                "invalid source type '{}': must be game, server or payment",
                self.source_type
            ))
        })?;
        let amount = Money::parse_positive(&self.amount).map_err(|e| match e {
            FormatError::NotPositive(_) => ProcessError::Validation(NOT_POSITIVE.to_string()),
            other => ProcessError::Validation(other.to_string()),
        })?;

        Ok(BalanceChange {
            user_id,
            external_id,
            direction,
            amount,
            source_type,
        })
    }
}

/// Transport-facing result of [`TransactionProcessor::process`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { balance: Money },
    NotFound { message: String },
    Conflict { message: String },
    ValidationError { message: String },
    InternalError { message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

impl From<ProcessError> for Outcome {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::NotFound(message) => Self::NotFound { message },
            ProcessError::Conflict(message) => Self::Conflict { message },
            ProcessError::Validation(message) => Self::ValidationError { message },
            ProcessError::Internal(message) => Self::InternalError { message },
        }
    }
}

impl From<Result<Committed, ProcessError>> for Outcome {
    fn from(result: Result<Committed, ProcessError>) -> Self {
        match result {
            Ok(committed) => Self::Success {
                balance: committed.balance,
            },
            Err(err) => err.into(),
        }
    }
}

/// Applies win/lose events to user balances through a [`LedgerStore`].
///
/// # Invariants
///
/// - An external id changes a balance at most once; every later submission
///   of it is a [`ProcessError::Conflict`] with no side effects.
/// - A `lose` never takes a balance below zero.
/// - Business results (not found, conflict, validation) are never reported as
///   [`ProcessError::Internal`].
pub struct TransactionProcessor<S> {
    store: S,
}

impl<S: LedgerStore> TransactionProcessor<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Applies one balance change.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Validation`] - non-positive amount or insufficient balance.
    /// - [`ProcessError::Conflict`] - the external id was already applied.
    /// - [`ProcessError::NotFound`] - the user does not exist.
    /// - [`ProcessError::Internal`] - the store failed; nothing was applied
    ///   and the request may be retried.
    pub fn apply(&self, change: BalanceChange) -> Result<Committed, ProcessError> {
        if !change.amount.is_positive() {
            return Err(ProcessError::Validation(NOT_POSITIVE.to_string()));
        }

        if self
            .store
            .entry_by_external_id(&change.external_id)
            .map_err(internal)?
            .is_some()
        {
            tracing::info!(
                user_id = %change.user_id,
                external_id = %change.external_id,
                "duplicate submission rejected before commit"
            );
            return Err(conflict(&change.external_id));
        }

        let user = self
            .store
            .user(change.user_id)
            .map_err(internal)?
            .ok_or_else(|| not_found(change.user_id))?;

        if change.direction.apply(user.balance, change.amount).is_none() {
            return Err(rejected(change.direction));
        }

        let user_id = change.user_id;
        let external_id = change.external_id.clone();
        match self.store.atomic_apply(change) {
            Ok(committed) => {
                tracing::info!(
                    %user_id,
                    %external_id,
                    balance = %committed.balance,
                    "balance updated"
                );
                Ok(committed)
            }
            Err(StoreError::DuplicateExternalId(_)) => {
                tracing::info!(%user_id, %external_id, "duplicate submission lost the race");
                Err(conflict(&external_id))
            }
            Err(StoreError::InsufficientFunds { .. }) => {
                Err(ProcessError::Validation(INSUFFICIENT_BALANCE.to_string()))
            }
            Err(StoreError::Overflow(_)) => {
                Err(ProcessError::Validation(BALANCE_OVERFLOW.to_string()))
            }
            Err(StoreError::UserNotFound(_)) => Err(not_found(user_id)),
            Err(other) => Err(internal(other)),
        }
    }

    /// Reads a user's current balance. No side effects.
    pub fn get_balance(&self, user_id: UserId) -> Result<User, ProcessError> {
        self.store
            .user(user_id)
            .map_err(internal)?
            .ok_or_else(|| not_found(user_id))
    }

    /// Validates a transport request, applies it, and reports the outcome.
    pub fn process(&self, request: TransactionRequest) -> Outcome {
        request
            .into_change()
            .and_then(|change| self.apply(change))
            .into()
    }
}

fn conflict(external_id: &ExternalId) -> ProcessError {
    ProcessError::Conflict(format!(
        "transaction {external_id} has already been processed"
    ))
}

fn not_found(user_id: UserId) -> ProcessError {
    ProcessError::NotFound(format!("user with ID {user_id} not found"))
}

fn rejected(direction: Direction) -> ProcessError {
    match direction {
        Direction::Lose => ProcessError::Validation(INSUFFICIENT_BALANCE.to_string()),
        Direction::Win => ProcessError::Validation(BALANCE_OVERFLOW.to_string()),
    }
}

fn internal(err: StoreError) -> ProcessError {
    tracing::error!(error = %err, "ledger store failure");
    ProcessError::Internal(err.to_string())
}
