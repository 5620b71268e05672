//! Voice XP counters.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use voxrank_core::{ParticipantId, VoiceXpRecord, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

impl Store {
    /// Create the flags and counter rows for a participant if absent,
    /// tagged with the current period keys.
    pub fn ensure_voice_participant(
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
                "INSERT OR IGNORE INTO voice_xp
                     (workspace_id, participant_id, monthly_key, weekly_key)
                 VALUES (?1, ?2, ?3, ?4)",
                params![workspace.0 as i64, participant.0 as i64, month_key, week_key],
            )
        })?;
        Ok(())
    }

    /// Atomically add voice XP across the lifetime and monthly windows.
    ///
    /// The monthly counter rolls lazily: a stale `monthly_key` means the
    /// increment becomes the new month's first value instead of piling onto
    /// the old one.
    pub fn add_voice_xp(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_voice_participant(workspace, participant, now)?;
        let (_week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE voice_xp
                 SET monthly_xp = CASE
                         WHEN monthly_key = ?1 THEN monthly_xp + ?2
                         ELSE ?2
                     END,
                     monthly_key = ?1,
                     lifetime_xp = lifetime_xp + ?2,
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

    /// Add to the live weekly counter and the per-week-key history row.
    pub fn add_voice_weekly_xp(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        amount: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_voice_participant(workspace, participant, now)?;
        let (week_key, _month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE voice_xp
                 SET weekly_xp = weekly_xp + ?1, weekly_key = ?2
                 WHERE workspace_id = ?3 AND participant_id = ?4",
                params![amount, week_key, workspace.0 as i64, participant.0 as i64],
            )
        })?;
        busy_retry(|| {
            conn.execute(
                "INSERT INTO voice_weekly_xp
                     (workspace_id, week_key, participant_id, weekly_xp, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(workspace_id, week_key, participant_id)
                 DO UPDATE SET
                     weekly_xp = voice_weekly_xp.weekly_xp + excluded.weekly_xp,
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

    /// Administrative override: set counters directly. The only path that
    /// may lower `lifetime_xp`.
    pub fn set_voice_xp(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        monthly_xp: i64,
        lifetime_xp: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_voice_participant(workspace, participant, now)?;
        let (_week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE voice_xp
                 SET monthly_xp = ?1, monthly_key = ?2, lifetime_xp = ?3, last_earned_at = ?4
                 WHERE workspace_id = ?5 AND participant_id = ?6",
                params![
                    monthly_xp,
                    month_key,
                    lifetime_xp,
                    ts(now),
                    workspace.0 as i64,
                    participant.0 as i64
                ],
            )
        })?;
        Ok(())
    }

    pub fn fetch_voice_record(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
    ) -> Result<Option<VoiceXpRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT lifetime_xp, monthly_xp, monthly_key, weekly_xp, weekly_key,
                        last_earned_at
                 FROM voice_xp
                 WHERE workspace_id = ?1 AND participant_id = ?2",
                params![workspace.0 as i64, participant.0 as i64],
                |row| {
                    Ok(VoiceXpRecord {
                        participant_id: participant,
                        lifetime_xp: row.get(0)?,
                        monthly_xp: row.get(1)?,
                        monthly_key: row.get(2)?,
                        weekly_xp: row.get(3)?,
                        weekly_key: row.get(4)?,
                        last_earned_at: parse_ts(row.get(5)?),
                    })
                },
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(record)
    }

    /// Participants currently eligible for a voice-XP grant: connected,
    /// not a bot source (bots never get presence rows), not opted out, not
    /// excluded, not departed. Returns `(participant, lifetime_xp)` so the
    /// caller can detect level changes without a second read.
    pub fn eligible_connected(
        &self,
        workspace: WorkspaceId,
    ) -> Result<Vec<(ParticipantId, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT p.participant_id, COALESCE(x.lifetime_xp, 0)
             FROM voice_presence p
             LEFT JOIN participant_flags f
               ON f.workspace_id = p.workspace_id
              AND f.participant_id = p.participant_id
             LEFT JOIN voice_xp x
               ON x.workspace_id = p.workspace_id
              AND x.participant_id = p.participant_id
             WHERE p.workspace_id = ?1
               AND p.is_connected = 1
               AND COALESCE(f.opted_out, 0) = 0
               AND COALESCE(f.excluded, 0) = 0
               AND f.left_at IS NULL
               AND f.deleted_at IS NULL
             ORDER BY p.participant_id ASC",
        )?;
        let rows = stmt
            .query_map([workspace.0 as i64], |row| {
                Ok((
                    ParticipantId(row.get::<_, i64>(0)? as u64),
                    row.get::<_, i64>(1)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Eager monthly reset for voice counters, re-tagged to the current key.
    pub fn reset_voice_monthly(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<usize> {
        let (_week_key, month_key) = self.ensure_period_state(workspace, now)?;
        let conn = self.conn();
        let rows = busy_retry(|| {
            conn.execute(
                "UPDATE voice_xp SET monthly_xp = 0, monthly_key = ?1 WHERE workspace_id = ?2",
                params![month_key, workspace.0 as i64],
            )
        })?;
        Ok(rows)
    }
}
