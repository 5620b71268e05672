//! Leaderboard candidate queries.
//!
//! Each query returns eligible rows with positive XP for one window; the
//! deterministic ordering itself lives in `voxrank-ranking`, so every
//! window shares one sort implementation.

use anyhow::Result;
use rusqlite::{params, Row};

use voxrank_core::{ParticipantId, RankRow, WorkspaceId};

use crate::{parse_ts, Store};

// Applied to every candidate query. `x` is the XP table alias, `f` the
// flags alias, `m` the members alias. Participants with no cached member
// row pass; only a recorded departure drops them.
const ELIGIBLE: &str = "
    AND COALESCE(f.opted_out, 0) = 0
    AND COALESCE(f.excluded, 0) = 0
    AND COALESCE(f.rank_visible, 1) = 1
    AND f.left_at IS NULL
    AND f.deleted_at IS NULL
    AND COALESCE(m.member_state, 1) != 2";

const JOINS: &str = "
    LEFT JOIN participant_flags f
      ON f.workspace_id = x.workspace_id AND f.participant_id = x.participant_id
    LEFT JOIN members m
      ON m.workspace_id = x.workspace_id AND m.participant_id = x.participant_id";

impl Store {
    /// Voice weekly candidates for a specific week key, from the history
    /// table so past weeks stay queryable after the live counters reset.
    pub fn weekly_candidates(&self, workspace: WorkspaceId, week_key: &str) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.weekly_xp, x.updated_at
             FROM voice_weekly_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.week_key = ?2 AND x.weekly_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64, week_key])
    }

    pub fn monthly_candidates(
        &self,
        workspace: WorkspaceId,
        month_key: &str,
    ) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.monthly_xp, x.last_earned_at
             FROM voice_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.monthly_key = ?2 AND x.monthly_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64, month_key])
    }

    pub fn lifetime_candidates(&self, workspace: WorkspaceId) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.lifetime_xp, x.last_earned_at
             FROM voice_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.lifetime_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64])
    }

    pub fn host_weekly_candidates(
        &self,
        workspace: WorkspaceId,
        week_key: &str,
    ) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.weekly_xp, x.updated_at
             FROM host_weekly_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.week_key = ?2 AND x.weekly_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64, week_key])
    }

    pub fn host_monthly_candidates(
        &self,
        workspace: WorkspaceId,
        month_key: &str,
    ) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.monthly_xp, x.last_earned_at
             FROM host_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.monthly_key = ?2 AND x.monthly_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64, month_key])
    }

    pub fn host_lifetime_candidates(&self, workspace: WorkspaceId) -> Result<Vec<RankRow>> {
        let sql = format!(
            "SELECT x.participant_id, x.total_xp, x.last_earned_at
             FROM host_xp x {JOINS}
             WHERE x.workspace_id = ?1 AND x.total_xp > 0 {ELIGIBLE}"
        );
        self.query_candidates(&sql, params![workspace.0 as i64])
    }

    fn query_candidates(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<RankRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, row_to_rank)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_rank(row: &Row<'_>) -> rusqlite::Result<RankRow> {
    Ok(RankRow {
        participant_id: ParticipantId(row.get::<_, i64>(0)? as u64),
        xp: row.get(1)?,
        last_earned_at: parse_ts(row.get(2)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use voxrank_core::PeriodClock;

    const WS: WorkspaceId = WorkspaceId(1);

    fn utc(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, d, 12, 0, 0).unwrap()
    }

    #[test]
    fn candidates_exclude_zero_xp_and_ineligible() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let now = utc(10);
        let earner = ParticipantId(1);
        let hidden = ParticipantId(2);
        let idle = ParticipantId(3);

        store.add_voice_xp(WS, earner, 5, now).unwrap();
        store.add_voice_xp(WS, hidden, 9, now).unwrap();
        store.set_rank_visible(WS, hidden, false).unwrap();
        store.ensure_voice_participant(WS, idle, now).unwrap();

        let rows = store.lifetime_candidates(WS).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].participant_id, earner);
        assert_eq!(rows[0].xp, 5);
        assert_eq!(rows[0].last_earned_at, Some(now));
    }

    #[test]
    fn weekly_candidates_read_history_not_live_counters() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let p = ParticipantId(1);
        store.add_voice_weekly_xp(WS, p, 4, utc(10)).unwrap(); // 2024-W24

        // Live weekly counters reset at the boundary; history remains.
        store.ensure_weekly_reset(WS, utc(17)).unwrap();
        let rows = store.weekly_candidates(WS, "2024-W24").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].xp, 4);
        assert!(store.weekly_candidates(WS, "2024-W25").unwrap().is_empty());
    }

    #[test]
    fn departed_members_drop_off_boards() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let now = utc(10);
        let p = ParticipantId(1);
        store.add_host_xp(WS, p, 6, now).unwrap();
        assert_eq!(store.host_lifetime_candidates(WS).unwrap().len(), 1);

        store.mark_left(WS, p, now).unwrap();
        assert!(store.host_lifetime_candidates(WS).unwrap().is_empty());
    }
}
