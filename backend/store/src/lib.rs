//! `voxrank-store` — durable SQLite-backed counter store.
//!
//! Owns every persisted entity: XP counters (voice and host, across the
//! lifetime/monthly/weekly windows), weekly history, presence records,
//! eligibility flags, directory cache, host sessions, and period state.
//! All writes are row-level atomic statements or short-lived exclusive
//! transactions, so tick engines and event handlers can share one store.

mod flags;
mod host;
mod members;
mod period;
mod presence;
mod ranking;
mod schema;
mod sessions;
mod voice;

pub use period::{workspace_meta_key, WeeklyResetOutcome};

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode};
use serde::Serialize;
use tracing::info;

use voxrank_core::{PeriodClock, WorkspaceId};

/// Shared handle to the SQLite store.
pub struct Store {
    conn: Mutex<Connection>,
    clock: PeriodClock,
}

impl Store {
    /// Open (or create) the store at `db_path` with WAL journaling.
    pub fn open(db_path: &Path, clock: PeriodClock) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir {}", parent.display()))?;
        }
        let conn = Connection::open(db_path)
            .with_context(|| format!("open store {}", db_path.display()))?;
        schema::init(&conn)?;
        info!(db_path = %db_path.display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    /// In-memory store for tests.
    pub fn open_in_memory(clock: PeriodClock) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory store")?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
        })
    }

    pub fn clock(&self) -> PeriodClock {
        self.clock
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // A poisoned lock only means some writer panicked mid-call; the
        // connection itself is still usable.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get_meta(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let value = conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(value)
    }

    pub fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )
        })?;
        Ok(())
    }

    /// Operational snapshot: current period keys plus row counts.
    pub fn debug_snapshot(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<DebugSnapshot> {
        let (week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        let ws = workspace.0 as i64;
        let count = |sql: &str| -> Result<i64> {
            Ok(conn.query_row(sql, [ws], |row| row.get(0))?)
        };
        Ok(DebugSnapshot {
            workspace,
            week_key,
            month_key,
            voice_rows: count("SELECT COUNT(*) FROM voice_xp WHERE workspace_id = ?1")?,
            host_rows: count("SELECT COUNT(*) FROM host_xp WHERE workspace_id = ?1")?,
            connected: count(
                "SELECT COUNT(*) FROM voice_presence WHERE workspace_id = ?1 AND is_connected = 1",
            )?,
            weekly_history_rows: count(
                "SELECT COUNT(*) FROM voice_weekly_xp WHERE workspace_id = ?1",
            )?,
            host_sessions: count("SELECT COUNT(*) FROM host_sessions WHERE workspace_id = ?1")?,
        })
    }
}

/// Operational inspection payload for `debug_snapshot`.
#[derive(Debug, Clone, Serialize)]
pub struct DebugSnapshot {
    pub workspace: WorkspaceId,
    pub week_key: String,
    pub month_key: String,
    pub voice_rows: i64,
    pub host_rows: i64,
    pub connected: i64,
    pub weekly_history_rows: i64,
    pub host_sessions: i64,
}

/// Retry a statement once when SQLite reports contention; anything else
/// surfaces immediately. A skipped row is picked up by the next tick.
pub(crate) fn busy_retry<T>(mut f: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let first = f();
    if let Err(rusqlite::Error::SqliteFailure(err, _)) = &first {
        if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) {
            return f();
        }
    }
    first
}

pub(crate) fn none_on_missing<T>(err: rusqlite::Error) -> rusqlite::Result<Option<T>> {
    match err {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(other),
    }
}

pub(crate) fn ts(t: DateTime<Utc>) -> String {
    t.to_rfc3339()
}

pub(crate) fn parse_ts(value: Option<String>) -> Option<DateTime<Utc>> {
    let value = value?;
    DateTime::parse_from_rfc3339(&value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
