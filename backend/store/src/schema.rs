//! Schema initialization. Idempotent; every table is `CREATE TABLE IF NOT
//! EXISTS` so opening an existing database is a no-op.

use anyhow::{Context, Result};
use rusqlite::Connection;

pub(crate) fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;

        CREATE TABLE IF NOT EXISTS meta (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS period_state (
            workspace_id      INTEGER PRIMARY KEY,
            current_week_key  TEXT NOT NULL,
            current_month_key TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS voice_xp (
            workspace_id   INTEGER NOT NULL,
            participant_id INTEGER NOT NULL,
            lifetime_xp    INTEGER NOT NULL DEFAULT 0,
            monthly_xp     INTEGER NOT NULL DEFAULT 0,
            monthly_key    TEXT NOT NULL,
            weekly_xp      INTEGER NOT NULL DEFAULT 0,
            weekly_key     TEXT NOT NULL,
            last_earned_at TEXT,
            PRIMARY KEY (workspace_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS voice_weekly_xp (
            workspace_id   INTEGER NOT NULL,
            week_key       TEXT NOT NULL,
            participant_id INTEGER NOT NULL,
            weekly_xp      INTEGER NOT NULL DEFAULT 0,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (workspace_id, week_key, participant_id)
        );

        CREATE TABLE IF NOT EXISTS host_xp (
            workspace_id     INTEGER NOT NULL,
            participant_id   INTEGER NOT NULL,
            total_xp         INTEGER NOT NULL DEFAULT 0,
            monthly_xp       INTEGER NOT NULL DEFAULT 0,
            monthly_key      TEXT NOT NULL,
            weekly_xp        INTEGER NOT NULL DEFAULT 0,
            weekly_key       TEXT NOT NULL,
            total_sessions   INTEGER NOT NULL DEFAULT 0,
            monthly_sessions INTEGER NOT NULL DEFAULT 0,
            weekly_sessions  INTEGER NOT NULL DEFAULT 0,
            last_earned_at   TEXT,
            PRIMARY KEY (workspace_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS host_weekly_xp (
            workspace_id   INTEGER NOT NULL,
            week_key       TEXT NOT NULL,
            participant_id INTEGER NOT NULL,
            weekly_xp      INTEGER NOT NULL DEFAULT 0,
            updated_at     TEXT NOT NULL,
            PRIMARY KEY (workspace_id, week_key, participant_id)
        );

        CREATE TABLE IF NOT EXISTS voice_presence (
            workspace_id    INTEGER NOT NULL,
            participant_id  INTEGER NOT NULL,
            is_connected    INTEGER NOT NULL DEFAULT 0,
            connected_since TEXT,
            PRIMARY KEY (workspace_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS participant_flags (
            workspace_id   INTEGER NOT NULL,
            participant_id INTEGER NOT NULL,
            opted_out      INTEGER NOT NULL DEFAULT 0,
            excluded       INTEGER NOT NULL DEFAULT 0,
            rank_visible   INTEGER NOT NULL DEFAULT 1,
            left_at        TEXT,
            deleted_at     TEXT,
            PRIMARY KEY (workspace_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS members (
            workspace_id   INTEGER NOT NULL,
            participant_id INTEGER NOT NULL,
            member_state   INTEGER NOT NULL DEFAULT 0,
            last_seen_at   TEXT,
            display_name   TEXT,
            PRIMARY KEY (workspace_id, participant_id)
        );

        CREATE TABLE IF NOT EXISTS host_sessions (
            workspace_id        INTEGER NOT NULL,
            channel_id          INTEGER NOT NULL,
            session_started_at  TEXT NOT NULL,
            deadline_at         TEXT NOT NULL,
            host_participant_id INTEGER,
            locked              INTEGER NOT NULL DEFAULT 0,
            last_seen_at        TEXT,
            timed_out           INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (workspace_id, channel_id)
        );

        CREATE TABLE IF NOT EXISTS host_channels (
            workspace_id INTEGER NOT NULL,
            channel_id   INTEGER NOT NULL,
            created_at   TEXT NOT NULL,
            PRIMARY KEY (workspace_id, channel_id)
        );
        "#,
    )
    .context("initialize store schema")?;
    Ok(())
}
