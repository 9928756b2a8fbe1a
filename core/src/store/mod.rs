//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The tracker, the batch stages and the reporter call typed store
//! methods; they never execute SQL directly.

use crate::error::PipelineResult;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{types::Type, Connection, Transaction, TransactionBehavior};

mod catalog;
mod daily_stat;
mod job_run;
mod playback;
mod settlement;

pub use catalog::{AdRecord, UserRecord, VideoRecord};
pub use daily_stat::{DailyStatSource, VideoStatTotals};
pub use settlement::VideoSettlementTotals;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct PipelineStore {
    conn: Connection,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl PipelineStore {
    pub fn open(path: &str) -> PipelineResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        // Concurrent writers on the same file wait instead of failing fast.
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(Self {
            conn,
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> PipelineResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn, path: None })
    }

    /// A second connection to the same file, for a concurrent writer.
    /// An in-memory store has nothing to share and yields a fresh, empty one.
    pub fn reopen(&self) -> PipelineResult<Self> {
        match self.path.as_deref() {
            Some(path) => Self::open(path),
            None => Self::in_memory(),
        }
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> PipelineResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_catalog.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_playback.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_daily_stats.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_settlement.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/005_job_run.sql"))?;
        Ok(())
    }

    /// Run `f` inside an IMMEDIATE transaction: the write lock is taken up
    /// front, so two callers racing on the same rows are serialized.
    /// Commits on `Ok`, rolls back on `Err`.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> PipelineResult<T>,
    ) -> PipelineResult<T> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }
}

// ── Column codecs ──────────────────────────────────────────────

pub(crate) fn ts_to_sql(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

pub(crate) fn date_to_sql(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub(crate) fn ts_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn date_from_row(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Half-open timestamp range covering one calendar day, as SQL text.
pub(crate) fn day_bounds(date: NaiveDate) -> (String, String) {
    let next = date.succ_opt().unwrap_or(date);
    (date_to_sql(date), date_to_sql(next))
}

pub(crate) fn flag(value: bool) -> i64 {
    if value { 1 } else { 0 }
}
