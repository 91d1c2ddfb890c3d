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

//! Append-only journal of committed mutations.
//!
//! Each line is one JSON [`JournalRecord`]. Records are written inside the
//! store's exclusive section before the in-memory state changes, so the
//! journal never lags a commit the caller was told about. Replaying it from
//! the start rebuilds every balance.
//!
//! ```text
//! {"record":"user_created","user_id":1,"balance":"0.00","at":"2025-01-01T00:00:00Z"}
//! {"record":"entry_committed","entry":{"id":1,"user_id":1,...},"balance":"10.50"}
//! ```

use crate::base::UserId;
use crate::entry::LedgerEntry;
use crate::error::StoreError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, BufRead, Write};

/// One durable mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum JournalRecord {
    UserCreated {
        user_id: UserId,
        balance: Money,
        at: DateTime<Utc>,
    },
    EntryCommitted {
        entry: LedgerEntry,
        /// Owner's balance right after the entry.
        balance: Money,
    },
}

struct Sink {
    writer: Box<dyn Write + Send>,
    poisoned: bool,
}

impl Sink {
    fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.writer.write_all(line)?;
        self.writer.flush()
    }
}

/// Serialized writer for [`JournalRecord`]s.
///
/// After the first failed write the journal is poisoned: whether that record
/// reached the medium is unknown, so every later append fails until the
/// process reopens the journal and recovers from it.
pub struct Journal {
    sink: Mutex<Sink>,
}

impl Journal {
    pub fn new<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Mutex::new(Sink {
                writer: Box::new(writer),
                poisoned: false,
            }),
        }
    }

    /// Writes and flushes one record.
    pub fn append(&self, record: &JournalRecord) -> Result<(), StoreError> {
        let mut line =
            serde_json::to_vec(record).map_err(|e| StoreError::Journal(e.to_string()))?;
        line.push(b'\n');

        let mut sink = self.sink.lock();
        if sink.poisoned {
            return Err(StoreError::Journal(
                "journal unusable after an earlier write failure".to_string(),
            ));
        }
        if let Err(e) = sink.write_line(&line) {
            sink.poisoned = true;
            tracing::error!(error = %e, "journal write failed; journal poisoned");
            return Err(StoreError::Journal(e.to_string()));
        }
        Ok(())
    }

    pub fn is_poisoned(&self) -> bool {
        self.sink.lock().poisoned
    }
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal")
            .field("poisoned", &self.is_poisoned())
            .finish()
    }
}

/// Streams records back out of a journal.
///
/// Only newline-terminated lines count as written, since [`Journal::append`]
/// reports success after the newline is flushed. A trailing fragment without
/// one is the torn tail of an interrupted write: it is dropped with a warning
/// and the stream ends. A terminated line that does not parse is
/// [`StoreError::Corrupt`]. Blank lines are ignored.
pub struct JournalReader<R> {
    reader: R,
    line: Vec<u8>,
    line_no: usize,
    intact_len: u64,
    done: bool,
}

impl<R: BufRead> JournalReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_no: 0,
            intact_len: 0,
            done: false,
        }
    }

    /// Length in bytes of the newline-terminated prefix read so far.
    ///
    /// Once the reader is exhausted, this is where the next append belongs.
    pub fn intact_len(&self) -> u64 {
        self.intact_len
    }
}

impl<R: BufRead> Iterator for JournalReader<R> {
    type Item = Result<JournalRecord, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) => {
                    self.done = true;
                    return Some(Err(StoreError::Journal(e.to_string())));
                }
            };
            self.line_no += 1;

            if self.line.last() != Some(&b'\n') {
                self.done = true;
                if !self.line.trim_ascii().is_empty() {
                    tracing::warn!(
                        line = self.line_no,
                        bytes = read,
                        "discarding torn journal tail"
                    );
                }
                break;
            }
            self.intact_len += read as u64;

            let text = self.line.trim_ascii();
            if text.is_empty() {
                continue;
            }
            return Some(match serde_json::from_slice::<JournalRecord>(text) {
                Ok(record) => Ok(record),
                Err(e) => {
                    self.done = true;
                    Err(StoreError::Corrupt(format!(
                        "journal line {} is unreadable: {e}",
                        self.line_no
                    )))
                }
            });
        }
        self.done = true;
        None
    }
}
