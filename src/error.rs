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

//! Error types for amount parsing, storage and processing.

use crate::base::{ExternalId, UserId};
use crate::money::Money;
use thiserror::Error;

/// Amount parsing errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Not a plain decimal number
    #[error("invalid amount '{0}': must be a decimal number")]
    Invalid(String),

    /// More than two digits after the decimal point
    #[error("invalid amount '{0}': at most 2 decimal places allowed")]
    TooManyFractionDigits(String),

    /// Below zero
    #[error("invalid amount '{0}': must not be negative")]
    Negative(String),

    /// Too large to be held with two fractional digits
    #[error("invalid amount '{0}': out of range")]
    OutOfRange(String),

    /// Zero where a positive amount is required
    #[error("invalid amount '{0}': must be positive")]
    NotPositive(String),
}

/// Conditions reported by a ledger store.
///
/// The first three are expected business results that the store detected
/// inside its atomic section. The rest are infrastructure failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The external id is already recorded; nothing was written
    #[error("external id {0} already recorded")]
    DuplicateExternalId(ExternalId),

    /// A debit exceeds the balance present at commit time
    #[error("insufficient funds for user {user_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        user_id: UserId,
        balance: Money,
        requested: Money,
    },

    /// The user row does not exist
    #[error("user {0} not found")]
    UserNotFound(UserId),

    /// User ids start at 1
    #[error("user id {0} is not valid: must be a positive integer")]
    InvalidUserId(UserId),

    /// The user row already exists
    #[error("user {0} already exists")]
    DuplicateUser(UserId),

    /// The balance would exceed the representable range
    #[error("balance overflow for user {0}")]
    Overflow(UserId),

    /// Exclusive access to the user row was not granted in time
    #[error("timed out waiting for exclusive access to user {0}")]
    LockTimeout(UserId),

    /// Journal could not be written
    #[error("journal write failed: {0}")]
    Journal(String),

    /// Journal contents contradict the rules they were written under
    #[error("corrupt journal: {0}")]
    Corrupt(String),
}

/// Caller-facing failure taxonomy of the transaction processor.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// Referenced user does not exist
    #[error("{0}")]
    NotFound(String),

    /// External id already applied
    #[error("{0}")]
    Conflict(String),

    /// Malformed input, non-positive amount, unknown direction or
    /// insufficient balance
    #[error("{0}")]
    Validation(String),

    /// Storage failure; safe to retry
    #[error("{0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_error_messages() {
        assert_eq!(
            FormatError::Invalid("abc".into()).to_string(),
            "invalid amount 'abc': must be a decimal number"
        );
        assert_eq!(
            FormatError::TooManyFractionDigits("1.234".into()).to_string(),
            "invalid amount '1.234': at most 2 decimal places allowed"
        );
        assert_eq!(
            FormatError::OutOfRange("1e40".into()).to_string(),
            "invalid amount '1e40': out of range"
        );
        assert_eq!(
            FormatError::NotPositive("0".into()).to_string(),
            "invalid amount '0': must be positive"
        );
    }

    #[test]
    fn store_error_messages() {
        let external_id = ExternalId::new("t1").unwrap();
        assert_eq!(
            StoreError::DuplicateExternalId(external_id).to_string(),
            "external id t1 already recorded"
        );
        assert_eq!(
            StoreError::InsufficientFunds {
                user_id: UserId(1),
                balance: Money::from_minor(1050),
                requested: Money::from_minor(2000),
            }
            .to_string(),
            "insufficient funds for user 1: balance 10.50, requested 20.00"
        );
        assert_eq!(
            StoreError::InvalidUserId(UserId(0)).to_string(),
            "user id 0 is not valid: must be a positive integer"
        );
        assert_eq!(
            StoreError::LockTimeout(UserId(3)).to_string(),
            "timed out waiting for exclusive access to user 3"
        );
    }

    #[test]
    fn process_error_displays_message_only() {
        assert_eq!(
            ProcessError::Validation("insufficient balance".into()).to_string(),
            "insufficient balance"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = StoreError::UserNotFound(UserId(9));
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
