//! Host XP counters and session counts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use voxrank_core::{HostXpRecord, ParticipantId, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

impl Store {
    pub fn ensure_host_participant(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let (week_key, month_key) = self.ensure_period_state(workspace, now)?;
        self.ensure_flags_row(workspace, participant)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT OR IGNORE INTO host_xp
                     (workspace_id, participant_id, monthly_key, weekly_key)
                 VALUES (?1, ?2, ?3, ?4)",
                params![workspace.0 as i64, participant.0 as i64, month_key, week_key],
            )
        })?;
        Ok(())
    }

    /// Add host XP to the total and monthly windows, with the same lazy
    /// monthly rollover as voice XP.
    pub fn add_host_xp(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_host_participant(workspace, participant, now)?;
        let (_week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_xp
                 SET monthly_xp = CASE
                         WHEN monthly_key = ?1 THEN monthly_xp + ?2
                         ELSE ?2
                     END,
                     monthly_key = ?1,
                     total_xp = total_xp + ?2,
                     last_earned_at = ?3
                 WHERE workspace_id = ?4 AND participant_id = ?5",
                params![
                    month_key,
                    amount,
                    ts(now),
                    workspace.0 as i64,
                    participant.0 as i64
                ],
            )
        })?;
        Ok(())
    }

    pub fn add_host_weekly_xp(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_host_participant(workspace, participant, now)?;
        let (week_key, _month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_xp
                 SET weekly_xp = weekly_xp + ?1, weekly_key = ?2
                 WHERE workspace_id = ?3 AND participant_id = ?4",
                params![amount, week_key, workspace.0 as i64, participant.0 as i64],
            )
        })?;
        busy_retry(|| {
            conn.execute(
                "INSERT INTO host_weekly_xp
                     (workspace_id, week_key, participant_id, weekly_xp, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(workspace_id, week_key, participant_id)
                 DO UPDATE SET
                     weekly_xp = host_weekly_xp.weekly_xp + excluded.weekly_xp,
                     updated_at = excluded.updated_at",
                params![
                    workspace.0 as i64,
                    week_key,
                    participant.0 as i64,
                    amount,
                    ts(now)
                ],
            )
        })?;
        Ok(())
    }

    /// Bump the per-window session counters by one. The weekly and monthly
    /// counters restart at 1 when their stored key is stale.
    pub fn bump_host_session_counts(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_host_participant(workspace, participant, now)?;
        let (week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_xp
                 SET monthly_sessions = CASE
                         WHEN monthly_key = ?1 THEN monthly_sessions + 1
                         ELSE 1
                     END,
                     monthly_key = ?1,
                     weekly_sessions = CASE
                         WHEN weekly_key = ?2 THEN weekly_sessions + 1
                         ELSE 1
                     END,
                     weekly_key = ?2,
                     total_sessions = total_sessions + 1
                 WHERE workspace_id = ?3 AND participant_id = ?4",
                params![month_key, week_key, workspace.0 as i64, participant.0 as i64],
            )
        })?;
        Ok(())
    }

    pub fn fetch_host_record(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
    ) -> Result<Option<HostXpRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT total_xp, monthly_xp, monthly_key, weekly_xp, weekly_key,
                        total_sessions, monthly_sessions, weekly_sessions, last_earned_at
                 FROM host_xp
                 WHERE workspace_id = ?1 AND participant_id = ?2",
                params![workspace.0 as i64, participant.0 as i64],
                |row| {
                    Ok(HostXpRecord {
                        participant_id: participant,
                        total_xp: row.get(0)?,
                        monthly_xp: row.get(1)?,
                        monthly_key: row.get(2)?,
                        weekly_xp: row.get(3)?,
                        weekly_key: row.get(4)?,
                        total_sessions: row.get(5)?,
                        monthly_sessions: row.get(6)?,
                        weekly_sessions: row.get(7)?,
                        last_earned_at: parse_ts(row.get(8)?),
                    })
                },
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(record)
    }

    /// Eager monthly reset for host counters.
    pub fn reset_host_monthly(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<usize> {
        let (_week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        let rows = busy_retry(|| {
            conn.execute(
                "UPDATE host_xp
                 SET monthly_xp = 0, monthly_sessions = 0, monthly_key = ?1
                 WHERE workspace_id = ?2",
                params![month_key, workspace.0 as i64],
            )
        })?;
        Ok(rows)
    }
}
