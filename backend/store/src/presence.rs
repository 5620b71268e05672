//! Voice presence records.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;

use voxrank_core::{ParticipantId, VoicePresenceRecord, WorkspaceId};

use crate::{busy_retry, none_on_missing, parse_ts, ts, Store};

impl Store {
    /// Upsert a single presence record (incremental join/leave path).
    pub fn set_presence(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        is_connected: bool,
        connected_since: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let since = if is_connected { connected_since } else { None };
        let conn = self.conn();
        busy_retry(|| {
            conn.execute(
                "INSERT INTO voice_presence
                     (workspace_id, participant_id, is_connected, connected_since)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(workspace_id, participant_id)
                 DO UPDATE SET
                     is_connected = excluded.is_connected,
                     connected_since = excluded.connected_since",
                params![
                    workspace.0 as i64,
                    participant.0 as i64,
                    is_connected as i64,
                    since.map(ts)
                ],
            )
        })?;
        Ok(())
    }

    /// Reconcile stored presence against the true connected set.
    ///
    /// Newly connected participants get `connected_since = now`; already
    /// connected ones keep their original timestamp; everyone else is
    /// marked disconnected. Returns the number of rows changed.
    pub fn apply_presence_snapshot(
        &self,
        workspace: WorkspaceId,
        connected: &HashSet<ParticipantId>,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let ws = workspace.0 as i64;
        let conn = self.conn();

        let mut stmt = conn.prepare(
            "SELECT participant_id, is_connected FROM voice_presence WHERE workspace_id = ?1",
        )?;
        let previous: HashMap<ParticipantId, bool> = stmt
            .query_map([ws], |row| {
                Ok((
                    ParticipantId(row.get::<_, i64>(0)? as u64),
                    row.get::<_, i64>(1)? != 0,
                ))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()?;
        drop(stmt);

        let mut changed = 0;
        for participant in connected {
            if previous.get(participant).copied().unwrap_or(false) {
                continue;
            }
            busy_retry(|| {
                conn.execute(
                    "INSERT INTO voice_presence
                         (workspace_id, participant_id, is_connected, connected_since)
                     VALUES (?1, ?2, 1, ?3)
                     ON CONFLICT(workspace_id, participant_id)
                     DO UPDATE SET is_connected = 1, connected_since = excluded.connected_since",
                    params![ws, participant.0 as i64, ts(now)],
                )
            })?;
            changed += 1;
        }
        for (participant, was_connected) in &previous {
            if *was_connected && !connected.contains(participant) {
                busy_retry(|| {
                    conn.execute(
                        "UPDATE voice_presence
                         SET is_connected = 0, connected_since = NULL
                         WHERE workspace_id = ?1 AND participant_id = ?2",
                        params![ws, participant.0 as i64],
                    )
                })?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Mark everyone in the workspace disconnected (startup restore path).
    pub fn reset_presence(&self, workspace: WorkspaceId) -> Result<usize> {
        let conn = self.conn();
        let rows = busy_retry(|| {
            conn.execute(
                "UPDATE voice_presence
                 SET is_connected = 0, connected_since = NULL
                 WHERE workspace_id = ?1",
                [workspace.0 as i64],
            )
        })?;
        Ok(rows)
    }

    pub fn fetch_presence(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
    ) -> Result<Option<VoicePresenceRecord>> {
        let conn = self.conn();
        let record = conn
            .query_row(
                "SELECT is_connected, connected_since
                 FROM voice_presence
                 WHERE workspace_id = ?1 AND participant_id = ?2",
                params![workspace.0 as i64, participant.0 as i64],
                |row| {
                    Ok(VoicePresenceRecord {
                        participant_id: participant,
                        is_connected: row.get::<_, i64>(0)? != 0,
                        connected_since: parse_ts(row.get(1)?),
                    })
                },
            )
            .map(Some)
            .or_else(none_on_missing)?;
        Ok(record)
    }
}
