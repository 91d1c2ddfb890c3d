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

//! Core identifier types and the closed tag sets carried by ledger entries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a pre-provisioned user.
///
/// Assigned externally; valid ids are strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    /// Returns `true` for ids the ledger can address (`> 0`).
    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Internal surrogate key of a ledger entry, allocated at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Caller-supplied idempotency key.
///
/// Globally unique across all users: an external id is applied at most once
/// no matter which user it targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ExternalId(String);

impl ExternalId {
    /// Wraps a non-empty key. Returns `None` for an empty string.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() { None } else { Some(Self(id)) }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Direction of a balance mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Credit.
    Win,
    /// Debit. Requires the current balance to cover the amount.
    Lose,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Lose => "lose",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "win" => Ok(Self::Win),
            "lose" => Ok(Self::Lose),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// Where an event originated. Opaque to the ledger, validated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Game,
    Server,
    Payment,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::Server => "server",
            Self::Payment => "payment",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "game" => Ok(Self::Game),
            "server" => Ok(Self::Server),
            "payment" => Ok(Self::Payment),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// A tag string outside its closed set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTag(pub String);

impl fmt::Display for UnknownTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tag '{}'", self.0)
    }
}

impl std::error::Error for UnknownTag {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_lowercase_only() {
        assert_eq!("win".parse::<Direction>(), Ok(Direction::Win));
        assert_eq!("lose".parse::<Direction>(), Ok(Direction::Lose));
        assert_eq!(
            "WIN".parse::<Direction>(),
            Err(UnknownTag("WIN".to_string()))
        );
        assert!("draw".parse::<Direction>().is_err());
    }

    #[test]
    fn source_type_closed_set() {
        for tag in ["game", "server", "payment"] {
            let parsed: SourceType = tag.parse().unwrap();
            assert_eq!(parsed.to_string(), tag);
        }
        assert!("casino".parse::<SourceType>().is_err());
    }

    #[test]
    fn external_id_rejects_empty() {
        assert!(ExternalId::new("").is_none());
        assert_eq!(ExternalId::new("t1").unwrap().as_str(), "t1");
    }

    #[test]
    fn user_id_zero_is_invalid() {
        assert!(!UserId(0).is_valid());
        assert!(UserId(1).is_valid());
    }
}
