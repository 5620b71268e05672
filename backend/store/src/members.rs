//! Directory membership cache.
//!
//! `members` mirrors the external directory so departure detection and
//! board filtering work without a directory round trip per tick.

use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::info;

use voxrank_core::{MemberProfile, MemberState, ParticipantId, WorkspaceId};

use crate::{busy_retry, ts, Store};

impl Store {
    /// Upsert the enumerated members as active.
    pub fn upsert_members(
        &self,
        workspace: WorkspaceId,
        members: &[MemberProfile],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        for member in members {
            busy_retry(|| {
                conn.execute(
                    "INSERT INTO members
                         (workspace_id, participant_id, member_state, last_seen_at, display_name)
                     VALUES (?1, ?2, ?3, ?4, ?5)
                     ON CONFLICT(workspace_id, participant_id)
                     DO UPDATE SET
                         member_state = excluded.member_state,
                         last_seen_at = excluded.last_seen_at,
                         display_name = excluded.display_name",
                    params![
                        workspace.0 as i64,
                        member.participant_id.0 as i64,
                        MemberState::Active.as_i64(),
                        ts(now),
                        member.display_name
                    ],
                )
            })?;
        }
        Ok(())
    }

    /// Mark cached members absent from `present` as departed, and stamp
    /// `left_at` on their flags. Callers must only invoke this after a
    /// COMPLETE enumeration; a partial listing would mass-depart everyone
    /// the listing missed.
    pub fn mark_members_left(
        &self,
        workspace: WorkspaceId,
        present: &HashSet<ParticipantId>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let cached = self.member_ids(workspace, MemberState::Active)?;
        let mut departed = 0;
        for participant in cached {
            if present.contains(&participant) {
                continue;
            }
            self.set_member_state(workspace, participant, MemberState::Left)?;
            self.mark_left(workspace, participant, now)?;
            departed += 1;
        }
        if departed > 0 {
            info!(workspace = %workspace, departed, "members marked departed");
        }
        Ok(departed)
    }

    /// Returning members go active again and earn immediately.
    pub fn mark_members_returned(
        &self,
        workspace: WorkspaceId,
        present: &HashSet<ParticipantId>,
    ) -> Result<usize> {
        let departed = self.member_ids(workspace, MemberState::Left)?;
        let mut returned = 0;
        for participant in departed {
            if !present.contains(&participant) {
                continue;
            }
            self.set_member_state(workspace, participant, MemberState::Active)?;
            self.clear_left(workspace, participant)?;
            returned += 1;
        }
        Ok(returned)
    }

    pub fn member_ids(
        &self,
        workspace: WorkspaceId,
        state: MemberState,
    ) -> Result<Vec<ParticipantId>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT participant_id FROM members
             WHERE workspace_id = ?1 AND member_state = ?2
             ORDER BY participant_id ASC",
        )?;
        let rows = stmt
            .query_map(params![workspace.0 as i64, state.as_i64()], |row| {
                Ok(ParticipantId(row.get::<_, i64>(0)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn set_member_state(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        state: MemberState,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT INTO members (workspace_id, participant_id, member_state)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(workspace_id, participant_id)
                 DO UPDATE SET member_state = excluded.member_state",
                params![workspace.0 as i64, participant.0 as i64, state.as_i64()],
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::PeriodClock;

    const WS: WorkspaceId = WorkspaceId(1);

    fn profile(id: u64, name: &str) -> MemberProfile {
        MemberProfile {
            participant_id: ParticipantId(id),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn departure_and_return_cycle() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        store
            .upsert_members(WS, &[profile(1, "ada"), profile(2, "ben")], now)
            .unwrap();

        // Second enumeration is missing ben.
        let present = HashSet::from([ParticipantId(1)]);
        let departed = store.mark_members_left(WS, &present, now).unwrap();
        assert_eq!(departed, 1);
        assert_eq!(
            store.member_ids(WS, MemberState::Left).unwrap(),
            vec![ParticipantId(2)]
        );
        let flags = store.fetch_flags(WS, ParticipantId(2)).unwrap().unwrap();
        assert_eq!(flags.left_at, Some(now));

        // Ben comes back.
        let present = HashSet::from([ParticipantId(1), ParticipantId(2)]);
        let returned = store.mark_members_returned(WS, &present).unwrap();
        assert_eq!(returned, 1);
        let flags = store.fetch_flags(WS, ParticipantId(2)).unwrap().unwrap();
        assert_eq!(flags.left_at, None);
    }
}
