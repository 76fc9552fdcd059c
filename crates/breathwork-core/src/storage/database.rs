//! SQLite-based session history.
//!
//! Provides persistent storage for:
//! - Finished sessions and their per-round retention times
//! - History statistics
//! - Key-value store for small bits of application state

use chrono::{DateTime, Local, NaiveTime, SecondsFormat, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::session::{RoundResult, SessionSettings};

/// A finished session as stored in the history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub speed: String,
    pub breaths: u32,
    /// Planned rounds, or `None` for unbounded sessions.
    pub rounds_planned: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub results: Vec<RoundResult>,
}

impl SessionRecord {
    pub fn new(
        id: impl Into<String>,
        settings: &SessionSettings,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        results: Vec<RoundResult>,
    ) -> Self {
        Self {
            id: id.into(),
            speed: settings.speed.to_string(),
            breaths: settings.breaths,
            rounds_planned: settings.rounds.finite(),
            started_at,
            completed_at,
            results,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HistoryStats {
    pub total_sessions: u64,
    pub total_rounds: u64,
    pub best_retention_secs: Option<u64>,
    pub average_retention_secs: Option<u64>,
    pub today_sessions: u64,
}

/// SQLite database for session history.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/breathwork/breathwork.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("breathwork.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> std::result::Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS sessions (
                id             TEXT PRIMARY KEY,
                speed          TEXT NOT NULL,
                breaths        INTEGER NOT NULL,
                rounds_planned INTEGER,
                started_at     TEXT NOT NULL,
                completed_at   TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS round_results (
                session_id     TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                round          INTEGER NOT NULL,
                retention_secs INTEGER NOT NULL,
                PRIMARY KEY (session_id, round)
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_completed_at ON sessions(completed_at);",
        )?;
        Ok(())
    }

    /// Record a finished session and its results.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(&mut self, record: &SessionRecord) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (id, speed, breaths, rounds_planned, started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.id,
                record.speed,
                record.breaths,
                record.rounds_planned,
                timestamp(&record.started_at),
                timestamp(&record.completed_at),
            ],
        )?;
        for result in &record.results {
            tx.execute(
                "INSERT INTO round_results (session_id, round, retention_secs) VALUES (?1, ?2, ?3)",
                params![record.id, result.round, result.retention_secs],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Most recent sessions first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, speed, breaths, rounds_planned, started_at, completed_at
             FROM sessions
             ORDER BY completed_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, Option<u32>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, speed, breaths, rounds_planned, started_at, completed_at) = row?;
            let results = self.results_for(&id)?;
            records.push(SessionRecord {
                id,
                speed,
                breaths,
                rounds_planned,
                started_at: parse_timestamp(&started_at)?,
                completed_at: parse_timestamp(&completed_at)?,
                results,
            });
        }
        Ok(records)
    }

    fn results_for(&self, session_id: &str) -> Result<Vec<RoundResult>> {
        let mut stmt = self.conn.prepare(
            "SELECT round, retention_secs FROM round_results
             WHERE session_id = ?1
             ORDER BY round",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok(RoundResult {
                round: row.get(0)?,
                retention_secs: row.get(1)?,
            })
        })?;
        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn stats(&self) -> Result<HistoryStats> {
        let (total_sessions, today_sessions): (u64, u64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN completed_at >= ?1 THEN 1 ELSE 0 END), 0)
             FROM sessions",
            params![timestamp(&start_of_day(&Local::now()))],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        let (total_rounds, best, average): (u64, Option<u64>, Option<f64>) = self.conn.query_row(
            "SELECT COUNT(*), MAX(retention_secs), AVG(retention_secs) FROM round_results",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        Ok(HistoryStats {
            total_sessions,
            total_rounds,
            best_retention_secs: best,
            average_retention_secs: average.map(|a| a.floor() as u64),
            today_sessions,
        })
    }

    /// Delete all recorded sessions. Returns how many were removed.
    pub fn clear_history(&self) -> Result<usize> {
        self.conn.execute("DELETE FROM round_results", [])?;
        Ok(self.conn.execute("DELETE FROM sessions", [])?)
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so stored timestamps sort as text.
fn timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Midnight of `now`'s calendar day in its own time zone, as UTC.
fn start_of_day<Tz: TimeZone>(now: &DateTime<Tz>) -> DateTime<Utc> {
    let midnight = now.date_naive().and_time(NaiveTime::MIN);
    match now.timezone().from_local_datetime(&midnight).earliest() {
        Some(t) => t.with_timezone(&Utc),
        // Midnight skipped by a DST change.
        None => Utc.from_utc_datetime(&midnight),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp '{raw}': {e}")).into())
}
