//! Participant eligibility flags.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use voxrank_core::{ParticipantFlags, ParticipantId, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

impl Store {
    pub(crate) fn ensure_flags_row(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT OR IGNORE INTO participant_flags (workspace_id, participant_id)
                 VALUES (?1, ?2)",
                params![workspace.0 as i64, participant.0 as i64],
            )
        })?;
        Ok(())
    }

    pub fn set_opted_out(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        opted_out: bool,
    ) -> Result<()> {
        self.set_flag(workspace, participant, "opted_out", opted_out as i64)
    }

    pub fn set_excluded(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        excluded: bool,
    ) -> Result<()> {
        self.set_flag(workspace, participant, "excluded", excluded as i64)
    }

    pub fn set_rank_visible(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        visible: bool,
    ) -> Result<()> {
        self.set_flag(workspace, participant, "rank_visible", visible as i64)
    }

    fn set_flag(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        column: &str,
        value: i64,
    ) -> Result<()> {
        self.ensure_flags_row(workspace, participant)?;
        let conn = self.conn();
        // Column name comes from a fixed set above, never from input.
        let sql = format!(
            "UPDATE participant_flags SET {column} = ?1
             WHERE workspace_id = ?2 AND participant_id = ?3"
        );
        busy_retry(|| {
            conn.execute(
                &sql,
                params![value, workspace.0 as i64, participant.0 as i64],
            )
        })?;
        Ok(())
    }

    /// Record a departure. Departed participants keep their counters but
    /// stop earning and drop off boards until `clear_left`.
    pub fn mark_left(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_flags_row(workspace, participant)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE participant_flags SET left_at = ?1
                 WHERE workspace_id = ?2 AND participant_id = ?3",
                params![ts(at), workspace.0 as i64, participant.0 as i64],
            )
        })?;
        Ok(())
    }

    /// Re-entry path: a returning participant earns again immediately.
    pub fn clear_left(&self, workspace: WorkspaceId, participant: ParticipantId) -> Result<()> {
        self.ensure_flags_row(workspace, participant)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE participant_flags SET left_at = NULL
                 WHERE workspace_id = ?1 AND participant_id = ?2",
                params![workspace.0 as i64, participant.0 as i64],
            )
        })?;
        Ok(())
    }

    pub fn fetch_flags(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
    ) -> Result<Option<ParticipantFlags>> {
        let conn = self.conn();
        let flags = conn
            .query_row(
                "SELECT opted_out, excluded, rank_visible, left_at, deleted_at
                 FROM participant_flags
                 WHERE workspace_id = ?1 AND participant_id = ?2",
                params![workspace.0 as i64, participant.0 as i64],
                |row| {
                    Ok(ParticipantFlags {
                        opted_out: row.get::<_, i64>(0)? != 0,
                        excluded: row.get::<_, i64>(1)? != 0,
                        rank_visible: row.get::<_, i64>(2)? != 0,
                        left_at: parse_ts(row.get(3)?),
                        deleted_at: parse_ts(row.get(4)?),
                    })
                },
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(flags)
    }

    /// Align stored exclusion flags with the configured exclusion list:
    /// everyone on the list is excluded, everyone else is not.
    pub fn sync_excluded(
        &self,
        workspace: WorkspaceId,
        excluded: &[ParticipantId],
    ) -> Result<()> {
        for participant in excluded {
            self.set_excluded(workspace, *participant, true)?;
        }
        let ids: Vec<String> = excluded.iter().map(|p| p.0.to_string()).collect();
        let conn = self.conn();
        let sql = if ids.is_empty() {
            "UPDATE participant_flags SET excluded = 0 WHERE workspace_id = ?1".to_string()
        } else {
            format!(
                "UPDATE participant_flags SET excluded = 0
                 WHERE workspace_id = ?1 AND participant_id NOT IN ({})",
                ids.join(",")
            )
        };
        busy_retry(|| conn.execute(&sql, [workspace.0 as i64]))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::PeriodClock;

    const WS: WorkspaceId = WorkspaceId(1);
    const P1: ParticipantId = ParticipantId(10);

    #[test]
    fn flags_default_to_eligible_and_visible() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        store.ensure_flags_row(WS, P1).unwrap();
        let flags = store.fetch_flags(WS, P1).unwrap().unwrap();
        assert!(!flags.is_ineligible());
        assert!(flags.rank_visible);
        assert_eq!(flags.left_at, None);
    }

    #[test]
    fn mark_left_then_clear_restores_eligibility() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let at = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        store.mark_left(WS, P1, at).unwrap();
        assert_eq!(store.fetch_flags(WS, P1).unwrap().unwrap().left_at, Some(at));
        store.clear_left(WS, P1).unwrap();
        assert_eq!(store.fetch_flags(WS, P1).unwrap().unwrap().left_at, None);
    }

    #[test]
    fn sync_excluded_adds_and_removes() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let p2 = ParticipantId(20);
        store.set_excluded(WS, P1, true).unwrap();

        store.sync_excluded(WS, &[p2]).unwrap();
        assert!(!store.fetch_flags(WS, P1).unwrap().unwrap().excluded);
        assert!(store.fetch_flags(WS, p2).unwrap().unwrap().excluded);

        store.sync_excluded(WS, &[]).unwrap();
        assert!(!store.fetch_flags(WS, p2).unwrap().unwrap().excluded);
    }
}
