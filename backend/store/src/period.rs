//! Period state and rollover.
//!
//! Monthly counters roll lazily: `ensure_period_state` zeroes them whenever
//! any read/write path observes a newer month key, so every XP-granting
//! write is period-safe even if the hourly engine's eager pass was skipped.
//! Weekly counters are deliberately NOT rolled here — only
//! `ensure_weekly_reset` zeroes them, once per detected week boundary,
//! under an exclusive transaction with a stored guard key.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};
use tracing::info;

use voxrank_core::{PeriodState, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

const LAST_WEEKLY_RESET_KEY: &str = "last_weekly_reset_key";

/// Guard keys live in the shared `meta` table, so they carry the
/// workspace id to keep every reset marker per-workspace.
pub fn workspace_meta_key(prefix: &str, workspace: WorkspaceId) -> String {
    format!("{prefix}:{workspace}")
}

/// Rows zeroed by a weekly reset.
#[derive(Debug, Clone)]
pub struct WeeklyResetOutcome {
    pub week_key: String,
    pub voice_rows: usize,
    pub host_rows: usize,
}

impl Store {
    /// Returns `(current_week_key, current_month_key)`, lazily creating the
    /// period-state row and applying the monthly rollover side effect when
    /// the stored month key is stale.
    pub fn ensure_period_state(
        &self,
        workspace: WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<(String, String)> {
        let now_week = self.clock().week_key(now);
        let now_month = self.clock().month_key(now);
        let ws = workspace.0 as i64;

        let mut conn = self.conn();
        let stored: Option<(String, String)> = conn
            .query_row(
                "SELECT current_week_key, current_month_key
                 FROM period_state WHERE workspace_id = ?1",
                [ws],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map(Some)
            .or_else(none_on_missing)?;

        let Some((prev_week, prev_month)) = stored else {
            busy_retry(|| {
                conn.execute(
                    "INSERT INTO period_state
                         (workspace_id, current_week_key, current_month_key, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![ws, now_week, now_month, ts(now)],
                )
            })?;
            return Ok((now_week, now_month));
        };

        let week_changed = prev_week != now_week;
        let month_changed = prev_month != now_month;
        if !week_changed && !month_changed {
            return Ok((prev_week, prev_month));
        }

        let tx = conn.transaction().context("period rollover transaction")?;
        if month_changed {
            tx.execute(
                "UPDATE voice_xp
                 SET monthly_xp = 0, monthly_key = ?1
                 WHERE workspace_id = ?2 AND monthly_key != ?1",
                params![now_month, ws],
            )?;
            tx.execute(
                "UPDATE host_xp
                 SET monthly_xp = 0, monthly_sessions = 0, monthly_key = ?1
                 WHERE workspace_id = ?2 AND monthly_key != ?1",
                params![now_month, ws],
            )?;
        }
        tx.execute(
            "UPDATE period_state
             SET current_week_key = ?1, current_month_key = ?2, updated_at = ?3
             WHERE workspace_id = ?4",
            params![now_week, now_month, ts(now), ws],
        )?;
        tx.commit()?;

        info!(
            workspace = %workspace,
            week_changed,
            month_changed,
            week_key = %now_week,
            month_key = %now_month,
            "period rollover applied"
        );
        Ok((now_week, now_month))
    }

    /// Zero the weekly counters once per detected week boundary.
    ///
    /// Guarded by the stored `last_weekly_reset_key`, so concurrent tick
    /// invocations (and restarts) apply it at most once; the guard and the
    /// zeroing commit together under `BEGIN IMMEDIATE`. Returns `None` when
    /// the reset was already applied for the current week.
    pub fn ensure_weekly_reset(
        &self,
        workspace: WorkspaceId,
        now: DateTime<Utc>,
    ) -> Result<Option<WeeklyResetOutcome>> {
        let (current_week, _month_key) = self.ensure_period_state(workspace, now)?;
        let guard_key = workspace_meta_key(LAST_WEEKLY_RESET_KEY, workspace);
        let last_reset = self.get_meta(&guard_key)?;
        if last_reset.as_deref() == Some(current_week.as_str()) {
            return Ok(None);
        }

        let ws = workspace.0 as i64;
        let mut conn = self.conn();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("weekly reset transaction")?;

        // Re-check the guard inside the exclusive transaction; a racing
        // tick may have won between the read above and BEGIN IMMEDIATE.
        let guard: Option<String> = tx
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                [guard_key.as_str()],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(none_on_missing)?;
        if guard.as_deref() == Some(current_week.as_str()) {
            return Ok(None);
        }

        let voice_rows = tx.execute(
            "UPDATE voice_xp SET weekly_xp = 0, weekly_key = ?1 WHERE workspace_id = ?2",
            params![current_week, ws],
        )?;
        let host_rows = tx.execute(
            "UPDATE host_xp
             SET weekly_xp = 0, weekly_sessions = 0, weekly_key = ?1
             WHERE workspace_id = ?2",
            params![current_week, ws],
        )?;
        tx.execute(
            "INSERT INTO meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![guard_key, current_week],
        )?;
        tx.commit()?;

        info!(
            workspace = %workspace,
            voice_rows,
            host_rows,
            week_key = %current_week,
            "weekly reset applied"
        );
        Ok(Some(WeeklyResetOutcome {
            week_key: current_week,
            voice_rows,
            host_rows,
        }))
    }

    pub fn fetch_period_state(&self, workspace: WorkspaceId) -> Result<Option<PeriodState>> {
        let conn = self.conn();
        let state = conn
            .query_row(
                "SELECT current_week_key, current_month_key, updated_at
                 FROM period_state WHERE workspace_id = ?1",
                [workspace.0 as i64],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(state.map(|(week, month, updated)| PeriodState {
            current_week_key: week,
            current_month_key: month,
            updated_at: parse_ts(Some(updated)).unwrap_or_default(),
        }))
    }

    /// Delete weekly history rows older than `min_week_key`. Week keys sort
    /// lexicographically, so a plain `<` comparison is the retention cutoff.
    pub fn prune_weekly_history(&self, min_week_key: &str) -> Result<usize> {
        let conn = self.conn();
        let voice = busy_retry(|| {
            conn.execute(
                "DELETE FROM voice_weekly_xp WHERE week_key < ?1",
                [min_week_key],
            )
        })?;
        let host = busy_retry(|| {
            conn.execute(
                "DELETE FROM host_weekly_xp WHERE week_key < ?1",
                [min_week_key],
            )
        })?;
        Ok(voice + host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::{ParticipantId, PeriodClock};

    fn utc(y: i32, mo: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, 3, 0, 0).unwrap()
    }

    const WS: WorkspaceId = WorkspaceId(1);
    const P1: ParticipantId = ParticipantId(10);

    #[test]
    fn ensure_period_state_is_idempotent_within_month() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let now = utc(2024, 6, 10);
        store.add_voice_xp(WS, P1, 5, now).unwrap();

        let first = store.ensure_period_state(WS, now).unwrap();
        let second = store.ensure_period_state(WS, now).unwrap();
        assert_eq!(first, second);

        let record = store.fetch_voice_record(WS, P1).unwrap().unwrap();
        assert_eq!(record.monthly_xp, 5);
    }

    #[test]
    fn month_change_zeroes_monthly_counters() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let june = utc(2024, 6, 10);
        store.add_voice_xp(WS, P1, 7, june).unwrap();
        store.add_host_xp(WS, P1, 3, june).unwrap();

        let (_, month) = store.ensure_period_state(WS, utc(2024, 7, 2)).unwrap();
        assert_eq!(month, "2024-07");

        let voice = store.fetch_voice_record(WS, P1).unwrap().unwrap();
        assert_eq!(voice.monthly_xp, 0);
        assert_eq!(voice.monthly_key, "2024-07");
        assert_eq!(voice.lifetime_xp, 7);

        let host = store.fetch_host_record(WS, P1).unwrap().unwrap();
        assert_eq!(host.monthly_xp, 0);
        assert_eq!(host.total_xp, 3);
    }

    #[test]
    fn weekly_reset_applies_at_most_once() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let now = utc(2024, 6, 10);
        store.add_voice_xp(WS, P1, 4, now).unwrap();
        store
            .add_voice_weekly_xp(WS, P1, 4, now)
            .unwrap();

        // First call on a fresh store seeds the guard key.
        let first = store.ensure_weekly_reset(WS, now).unwrap();
        assert!(first.is_some());

        let second = store.ensure_weekly_reset(WS, now).unwrap();
        assert!(second.is_none(), "same-week reset must be a no-op");

        // Next week triggers exactly one more reset.
        let next_week = utc(2024, 6, 17);
        let third = store.ensure_weekly_reset(WS, next_week).unwrap().unwrap();
        assert_eq!(third.week_key, "2024-W25");
        assert_eq!(third.voice_rows, 1);
        let record = store.fetch_voice_record(WS, P1).unwrap().unwrap();
        assert_eq!(record.weekly_xp, 0);
        assert_eq!(record.weekly_key, "2024-W25");
    }

    #[test]
    fn weekly_reset_covers_each_workspace_independently() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let other = WorkspaceId(2);
        let seeded = utc(2024, 6, 10); // 2024-W24
        store.add_voice_xp(WS, P1, 7, seeded).unwrap();
        store.add_voice_weekly_xp(WS, P1, 7, seeded).unwrap();
        store.add_voice_xp(other, P1, 7, seeded).unwrap();
        store.add_voice_weekly_xp(other, P1, 7, seeded).unwrap();
        store.ensure_weekly_reset(WS, seeded).unwrap();
        store.ensure_weekly_reset(other, seeded).unwrap();

        // One workspace crossing the boundary must not consume the
        // guard for the other.
        let boundary = utc(2024, 6, 17); // 2024-W25
        let first = store.ensure_weekly_reset(WS, boundary).unwrap();
        let second = store.ensure_weekly_reset(other, boundary).unwrap();
        assert!(first.is_some());
        assert!(
            second.is_some(),
            "second workspace must get its own reset at the boundary"
        );

        for ws in [WS, other] {
            let record = store.fetch_voice_record(ws, P1).unwrap().unwrap();
            assert_eq!(record.weekly_xp, 0);
            assert_eq!(record.weekly_key, "2024-W25");
        }
    }

    #[test]
    fn prune_drops_old_history_only() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let old = utc(2024, 1, 8); // 2024-W02
        let recent = utc(2024, 6, 10); // 2024-W24
        store.add_voice_weekly_xp(WS, P1, 2, old).unwrap();
        store.add_voice_weekly_xp(WS, P1, 2, recent).unwrap();

        let pruned = store.prune_weekly_history("2024-W13").unwrap();
        assert_eq!(pruned, 1);
        let remaining = store
            .weekly_candidates(WS, "2024-W24")
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
