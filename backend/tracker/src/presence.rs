//! Voice presence tracker.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use voxrank_core::{ChannelOccupancy, ParticipantId, WorkspaceId};
use voxrank_store::Store;

/// Keeps `voice_presence` aligned with reality. The per-minute snapshot
/// reconcile is authoritative; join/leave events only tighten latency
/// between snapshots.
pub struct PresenceTracker {
    store: Arc<Store>,
}

impl PresenceTracker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Apply a full occupancy snapshot. Bots never get presence rows.
    pub fn reconcile(
        &self,
        workspace: WorkspaceId,
        channels: &[ChannelOccupancy],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let connected: HashSet<ParticipantId> = channels
            .iter()
            .flat_map(|c| c.occupants.iter())
            .filter(|o| !o.is_bot)
            .map(|o| o.participant_id)
            .collect();
        let changed = self.store.apply_presence_snapshot(workspace, &connected, now)?;
        if changed > 0 {
            debug!(workspace = %workspace, changed, connected = connected.len(), "presence reconciled");
        }
        Ok(changed)
    }

    pub fn handle_join(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        is_bot: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if is_bot {
            return Ok(());
        }
        self.store.set_presence(workspace, participant, true, Some(now))
    }

    pub fn handle_leave(&self, workspace: WorkspaceId, participant: ParticipantId) -> Result<()> {
        self.store.set_presence(workspace, participant, false, None)
    }

    /// Startup path: stored connections from a previous run are stale until
    /// the first snapshot lands, so mark everyone disconnected.
    pub fn restore(&self, workspace: WorkspaceId) -> Result<usize> {
        self.store.reset_presence(workspace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::{ChannelId, Occupant, PeriodClock};

    const WS: WorkspaceId = WorkspaceId(1);

    fn occupancy(channel: u64, occupants: &[(u64, bool)]) -> ChannelOccupancy {
        ChannelOccupancy {
            channel_id: ChannelId(channel),
            occupants: occupants
                .iter()
                .map(|&(id, is_bot)| Occupant {
                    participant_id: ParticipantId(id),
                    is_bot,
                })
                .collect(),
        }
    }

    #[test]
    fn reconcile_skips_bots() {
        let store = Arc::new(Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap());
        let tracker = PresenceTracker::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();

        let snapshot = vec![occupancy(100, &[(1, false), (2, true)])];
        tracker.reconcile(WS, &snapshot, now).unwrap();

        assert!(store.fetch_presence(WS, ParticipantId(1)).unwrap().unwrap().is_connected);
        assert!(store.fetch_presence(WS, ParticipantId(2)).unwrap().is_none());
    }

    #[test]
    fn restore_disconnects_everyone() {
        let store = Arc::new(Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap());
        let tracker = PresenceTracker::new(store.clone());
        let now = Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap();
        tracker.handle_join(WS, ParticipantId(1), false, now).unwrap();

        let reset = tracker.restore(WS).unwrap();
        assert_eq!(reset, 1);
        let record = store.fetch_presence(WS, ParticipantId(1)).unwrap().unwrap();
        assert!(!record.is_connected);
    }
}
