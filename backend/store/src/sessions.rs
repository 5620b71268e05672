//! Host session and trackable-channel persistence.
//!
//! These rows are the durable half of the host state machine: the tracker
//! decides transitions, the store records them so a restart can restore
//! pending deadlines and locked hosts.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use voxrank_core::{ChannelId, HostSessionRecord, ParticipantId, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

impl Store {
    /// Begin (or restart) a confirmation window for a channel. Any prior
    /// session state for the channel is discarded.
    pub fn start_host_session(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        started_at: DateTime<Utc>,
        deadline_at: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT INTO host_sessions
                     (workspace_id, channel_id, session_started_at, deadline_at,
                      host_participant_id, locked, last_seen_at, timed_out)
                 VALUES (?1, ?2, ?3, ?4, NULL, 0, NULL, 0)
                 ON CONFLICT(workspace_id, channel_id)
                 DO UPDATE SET
                     session_started_at = excluded.session_started_at,
                     deadline_at = excluded.deadline_at,
                     host_participant_id = NULL,
                     locked = 0,
                     last_seen_at = NULL,
                     timed_out = 0",
                params![
                    workspace.0 as i64,
                    channel.0 as i64,
                    ts(started_at),
                    ts(deadline_at)
                ],
            )
        })?;
        Ok(())
    }

    /// Record that the channel's session was observed alive at `now`.
    pub fn touch_host_session(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_sessions SET last_seen_at = ?1
                 WHERE workspace_id = ?2 AND channel_id = ?3",
                params![ts(now), workspace.0 as i64, channel.0 as i64],
            )
        })?;
        Ok(())
    }

    /// Lock the named participant in as the channel's host.
    pub fn confirm_host(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        host: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_sessions
                 SET host_participant_id = ?1, locked = 1, timed_out = 0, last_seen_at = ?2
                 WHERE workspace_id = ?3 AND channel_id = ?4",
                params![host.0 as i64, ts(now), workspace.0 as i64, channel.0 as i64],
            )
        })?;
        Ok(())
    }

    /// Expire a session whose deadline passed unconfirmed. Forces the lock
    /// off so a late confirmation cannot resurrect it.
    pub fn mark_host_timeout(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "UPDATE host_sessions
                 SET timed_out = 1, locked = 0, host_participant_id = NULL
                 WHERE workspace_id = ?1 AND channel_id = ?2",
                params![workspace.0 as i64, channel.0 as i64],
            )
        })?;
        Ok(())
    }

    /// Drop a channel's session entirely (channel emptied or deleted).
    pub fn clear_host_session(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "DELETE FROM host_sessions WHERE workspace_id = ?1 AND channel_id = ?2",
                params![workspace.0 as i64, channel.0 as i64],
            )
        })?;
        Ok(())
    }

    pub fn fetch_host_session(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
    ) -> Result<Option<HostSessionRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT session_started_at, deadline_at, host_participant_id,
                        locked, last_seen_at, timed_out
                 FROM host_sessions
                 WHERE workspace_id = ?1 AND channel_id = ?2",
                params![workspace.0 as i64, channel.0 as i64],
                |row| row_to_session(channel, row),
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(record)
    }

    /// All live sessions for the workspace (restore path).
    pub fn fetch_host_sessions(&self, workspace: WorkspaceId) -> Result<Vec<HostSessionRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT channel_id, session_started_at, deadline_at, host_participant_id,
                    locked, last_seen_at, timed_out
             FROM host_sessions
             WHERE workspace_id = ?1
             ORDER BY channel_id ASC",
        )?;
        let rows = stmt
            .query_map([workspace.0 as i64], |row| {
                let channel = ChannelId(row.get::<_, i64>(0)? as u64);
                row_to_session_offset(channel, row, 1)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn add_host_channel(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT OR IGNORE INTO host_channels (workspace_id, channel_id, created_at)
                 VALUES (?1, ?2, ?3)",
                params![workspace.0 as i64, channel.0 as i64, ts(now)],
            )
        })?;
        Ok(())
    }

    /// Untrack a channel and drop any session it had.
    pub fn remove_host_channel(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<()> {
        self.clear_host_session(workspace, channel)?;
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "DELETE FROM host_channels WHERE workspace_id = ?1 AND channel_id = ?2",
                params![workspace.0 as i64, channel.0 as i64],
            )
        })?;
        Ok(())
    }

    pub fn is_host_channel(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<bool> {
        let conn = self.conn();
        let found = conn
            .query_row(
                "SELECT 1 FROM host_channels WHERE workspace_id = ?1 AND channel_id = ?2",
                params![workspace.0 as i64, channel.0 as i64],
                |_| Ok(()),
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(found.is_some())
    }

    pub fn list_host_channels(&self, workspace: WorkspaceId) -> Result<Vec<ChannelId>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT channel_id FROM host_channels WHERE workspace_id = ?1 ORDER BY channel_id ASC",
        )?;
        let rows = stmt
            .query_map([workspace.0 as i64], |row| {
                Ok(ChannelId(row.get::<_, i64>(0)? as u64))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn row_to_session(channel: ChannelId, row: &rusqlite::Row<'_>) -> rusqlite::Result<HostSessionRecord> {
    row_to_session_offset(channel, row, 0)
}

fn row_to_session_offset(
    channel: ChannelId,
    row: &rusqlite::Row<'_>,
    base: usize,
) -> rusqlite::Result<HostSessionRecord> {
    Ok(HostSessionRecord {
        channel_id: channel,
        session_started_at: parse_ts(row.get(base)?).unwrap_or_default(),
        deadline_at: parse_ts(row.get(base + 1)?).unwrap_or_default(),
        host_participant_id: row
            .get::<_, Option<i64>>(base + 2)?
            .map(|id| ParticipantId(id as u64)),
        locked: row.get::<_, i64>(base + 3)? != 0,
        last_seen_at: parse_ts(row.get(base + 4)?),
        timed_out: row.get::<_, i64>(base + 5)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use voxrank_core::PeriodClock;

    const WS: WorkspaceId = WorkspaceId(1);
    const CH: ChannelId = ChannelId(500);
    const HOST: ParticipantId = ParticipantId(42);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn session_lifecycle_confirm() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        let deadline = t0() + Duration::seconds(120);
        store.start_host_session(WS, CH, t0(), deadline).unwrap();

        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(!session.locked);
        assert_eq!(session.deadline_at, deadline);

        store.confirm_host(WS, CH, HOST, t0() + Duration::seconds(30)).unwrap();
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(session.locked);
        assert!(!session.timed_out);
        assert_eq!(session.host_participant_id, Some(HOST));

        store.clear_host_session(WS, CH).unwrap();
        assert!(store.fetch_host_session(WS, CH).unwrap().is_none());
    }

    #[test]
    fn timeout_unlocks_and_drops_host() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        store
            .start_host_session(WS, CH, t0(), t0() + Duration::seconds(120))
            .unwrap();
        store.confirm_host(WS, CH, HOST, t0()).unwrap();
        store.mark_host_timeout(WS, CH).unwrap();

        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(session.timed_out);
        assert!(!session.locked);
        assert_eq!(session.host_participant_id, None);
    }

    #[test]
    fn restart_resets_prior_state() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        store
            .start_host_session(WS, CH, t0(), t0() + Duration::seconds(120))
            .unwrap();
        store.mark_host_timeout(WS, CH).unwrap();

        // New session on the same channel starts clean.
        let t1 = t0() + Duration::minutes(10);
        store
            .start_host_session(WS, CH, t1, t1 + Duration::seconds(120))
            .unwrap();
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(!session.timed_out);
        assert!(!session.locked);
        assert_eq!(session.session_started_at, t1);
    }

    #[test]
    fn host_channel_registry() {
        let store = Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap();
        assert!(!store.is_host_channel(WS, CH).unwrap());
        store.add_host_channel(WS, CH, t0()).unwrap();
        store.add_host_channel(WS, CH, t0()).unwrap();
        assert!(store.is_host_channel(WS, CH).unwrap());
        assert_eq!(store.list_host_channels(WS).unwrap(), vec![CH]);

        store
            .start_host_session(WS, CH, t0(), t0() + Duration::seconds(120))
            .unwrap();
        store.remove_host_channel(WS, CH).unwrap();
        assert!(!store.is_host_channel(WS, CH).unwrap());
        assert!(store.fetch_host_session(WS, CH).unwrap().is_none());
    }
}
