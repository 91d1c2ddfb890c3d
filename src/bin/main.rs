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

use balance_ledger::{
    LedgerStore, MemoryStore, Money, Outcome, StoreConfig, TransactionProcessor,
    TransactionRequest, UserId,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use serde::Serialize;
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Balance Ledger - Apply win/lose event CSV files
///
/// Reads events from a CSV file, applies each one exactly once, and writes
/// the resulting user balances to stdout.
#[derive(Parser, Debug)]
#[command(name = "balance-ledger")]
#[command(about = "Applies win/lose events to user balances exactly once", long_about = None)]
struct Args {
    /// Path to CSV file with events
    ///
    /// Expected format: user_id,external_id,direction,amount,source_type
    /// Example: cargo run -- events.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Journal to recover from and append to
    #[arg(long, env = "LEDGER_JOURNAL", value_name = "PATH")]
    journal: Option<PathBuf>,

    /// Users provisioned at zero balance if they do not exist yet
    #[arg(
        long,
        env = "LEDGER_SEED_USERS",
        value_delimiter = ',',
        default_value = "1,2,3",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    seed_users: Vec<u64>,

    /// Longest wait for exclusive access to a user's balance
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = 5000)]
    lock_timeout_ms: u64,
}

impl Args {
    fn store_config(&self) -> StoreConfig {
        StoreConfig::default().with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if let Err(e) = run(&args) {
        tracing::error!(error = %e, "balance-ledger failed");
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn Error>> {
    let store = open_store(args.store_config(), args.journal.as_deref())?;
    for id in &args.seed_users {
        store.ensure_user(UserId(*id))?;
    }

    let file = File::open(&args.input)
        .map_err(|e| format!("cannot open '{}': {e}", args.input.display()))?;
    let processor = TransactionProcessor::new(store);
    let summary = process_events(&processor, BufReader::new(file))?;
    tracing::info!(
        applied = summary.applied,
        rejected = summary.rejected,
        skipped = summary.skipped,
        "events processed"
    );

    write_balances(processor.store(), std::io::stdout())?;
    Ok(())
}

/// Opens the store, replaying `journal` first when one is given.
fn open_store(config: StoreConfig, journal: Option<&Path>) -> Result<MemoryStore, Box<dyn Error>> {
    match journal {
        Some(path) => Ok(MemoryStore::open(config, path)?),
        None => Ok(MemoryStore::new(config)),
    }
}

/// Counts of what happened to each CSV row.
#[derive(Debug, Default, PartialEq, Eq)]
struct Summary {
    applied: usize,
    rejected: usize,
    skipped: usize,
}

/// Streams events from a CSV reader through the processor.
///
/// Rows that do not deserialize are skipped; rows the processor rejects are
/// logged with their outcome. Neither stops processing.
///
/// # CSV Format
///
/// ```csv
/// user_id,external_id,direction,amount,source_type
/// 1,t1,win,10.50,game
/// 1,t2,lose,20.00,payment
/// ```
///
/// # Errors
///
/// Returns a CSV error only if the header cannot be read.
fn process_events<S: LedgerStore, R: Read>(
    processor: &TransactionProcessor<S>,
    reader: R,
) -> Result<Summary, csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .has_headers(true)
        .from_reader(reader);
    rdr.headers()?;

    let mut summary = Summary::default();
    for result in rdr.deserialize::<TransactionRequest>() {
        let request = match result {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed row");
                summary.skipped += 1;
                continue;
            }
        };

        let external_id = request.external_id.clone();
        match processor.process(request) {
            Outcome::Success { .. } => summary.applied += 1,
            outcome => {
                tracing::warn!(%external_id, ?outcome, "event not applied");
                summary.rejected += 1;
            }
        }
    }

    Ok(summary)
}

#[derive(Debug, Serialize)]
struct BalanceRow {
    user_id: u64,
    balance: Money,
}

/// Writes every user's balance as CSV, ordered by user id.
///
/// ```csv
/// user_id,balance
/// 1,10.50
/// 2,0.00
/// ```
fn write_balances<W: Write>(store: &MemoryStore, writer: W) -> Result<(), Box<dyn Error>> {
    let mut wtr = Writer::from_writer(writer);
    for user_id in store.user_ids() {
        if let Some(user) = store.user(user_id)? {
            wtr.serialize(BalanceRow {
                user_id: user.id.0,
                balance: user.balance,
            })?;
        }
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn seeded_processor() -> TransactionProcessor<MemoryStore> {
        let store = MemoryStore::new(StoreConfig::default());
        for id in 1..=3 {
            store.ensure_user(UserId(id)).unwrap();
        }
        TransactionProcessor::new(store)
    }

    fn balance(processor: &TransactionProcessor<MemoryStore>, id: u64) -> String {
        processor.get_balance(UserId(id)).unwrap().balance.to_string()
    }

    #[test]
    fn applies_scenario_rows() {
        let csv = "user_id,external_id,direction,amount,source_type\n\
                   1,t1,win,10.50,game\n\
                   1,t1,win,10.50,game\n\
                   1,t2,lose,20.00,game\n\
                   999,t3,win,1.00,game\n";
        let processor = seeded_processor();

        let summary = process_events(&processor, Cursor::new(csv)).unwrap();

        assert_eq!(
            summary,
            Summary {
                applied: 1,
                rejected: 3,
                skipped: 0
            }
        );
        assert_eq!(balance(&processor, 1), "10.50");
    }

    #[test]
    fn trims_whitespace() {
        let csv = "user_id,external_id,direction,amount,source_type\n 2 , t1 , win , 5 , server \n";
        let processor = seeded_processor();

        process_events(&processor, Cursor::new(csv)).unwrap();

        assert_eq!(balance(&processor, 2), "5.00");
    }

    #[test]
    fn skips_malformed_rows() {
        let csv = "user_id,external_id,direction,amount,source_type\n\
                   1,t1,win,1.00,game\n\
                   not-a-number,t2,win,1.00,game\n\
                   1,t3,win\n\
                   1,t4,win,2.00,payment\n";
        let processor = seeded_processor();

        let summary = process_events(&processor, Cursor::new(csv)).unwrap();

        assert_eq!(summary.applied, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(balance(&processor, 1), "3.00");
    }

    #[test]
    fn seed_users_must_be_positive() {
        let args = Args::try_parse_from(["balance-ledger", "--seed-users", "1,2", "events.csv"])
            .unwrap();
        assert_eq!(args.seed_users, vec![1, 2]);

        let zero = Args::try_parse_from(["balance-ledger", "--seed-users", "0,1", "events.csv"]);
        assert!(zero.is_err());
    }

    #[test]
    fn writes_balances_in_user_order() {
        let csv = "user_id,external_id,direction,amount,source_type\n\
                   3,a,win,1.5,game\n\
                   1,b,win,2,game\n";
        let processor = seeded_processor();
        process_events(&processor, Cursor::new(csv)).unwrap();

        let mut output = Vec::new();
        write_balances(processor.store(), &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "user_id,balance\n1,2.00\n2,0.00\n3,1.50\n"
        );
    }
}
