//! Host-confirmation state machine.
//!
//! Per trackable channel: first occupancy opens a confirmation window with
//! a fixed deadline; an in-window confirmation locks the named host for the
//! life of the session; an expired window marks the session timed out, and
//! a timed-out session never earns, no matter what arrives later. The
//! channel emptying (or being deleted) discards the session entirely.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use voxrank_core::{ChannelId, ChannelOccupancy, ConfirmationEvent, WorkspaceId};
use voxrank_store::Store;

pub struct HostTracker {
    store: Arc<Store>,
    confirmation_window: Duration,
    min_occupancy: usize,
}

impl HostTracker {
    pub fn new(store: Arc<Store>, confirmation_window_secs: i64, min_occupancy: usize) -> Self {
        Self {
            store,
            confirmation_window: Duration::seconds(confirmation_window_secs),
            min_occupancy,
        }
    }

    pub fn handle_channel_created(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.store.add_host_channel(workspace, channel, now)
    }

    pub fn handle_channel_deleted(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<()> {
        self.store.remove_host_channel(workspace, channel)
    }

    /// Advance one channel's session state from its current occupancy.
    pub fn observe_channel(
        &self,
        workspace: WorkspaceId,
        occupancy: &ChannelOccupancy,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let channel = occupancy.channel_id;
        if !self.store.is_host_channel(workspace, channel)? {
            return Ok(());
        }
        let humans = occupancy.human_count();
        let session = self.store.fetch_host_session(workspace, channel)?;

        match session {
            None => {
                if humans > 0 {
                    let deadline = now + self.confirmation_window;
                    self.store
                        .start_host_session(workspace, channel, now, deadline)?;
                    info!(workspace = %workspace, %channel, %deadline, "confirmation window opened");
                }
            }
            Some(session) => {
                if humans == 0 {
                    self.store.clear_host_session(workspace, channel)?;
                    debug!(workspace = %workspace, %channel, "channel emptied, session discarded");
                    return Ok(());
                }
                self.store.touch_host_session(workspace, channel, now)?;
                if !session.locked && !session.timed_out && now > session.deadline_at {
                    self.store.mark_host_timeout(workspace, channel)?;
                    info!(workspace = %workspace, %channel, "confirmation window expired");
                }
            }
        }
        Ok(())
    }

    /// Per-tick pass over every trackable channel. Channels missing from
    /// the snapshot are treated as empty.
    pub fn reconcile(
        &self,
        workspace: WorkspaceId,
        channels: &[ChannelOccupancy],
        now: DateTime<Utc>,
    ) -> Result<()> {
        let by_id: HashMap<ChannelId, &ChannelOccupancy> =
            channels.iter().map(|c| (c.channel_id, c)).collect();
        for channel in self.store.list_host_channels(workspace)? {
            match by_id.get(&channel) {
                Some(occupancy) => self.observe_channel(workspace, occupancy, now)?,
                None => {
                    let empty = ChannelOccupancy {
                        channel_id: channel,
                        occupants: Vec::new(),
                    };
                    self.observe_channel(workspace, &empty, now)?;
                }
            }
        }
        Ok(())
    }

    /// Process a "participant X was named host of channel Z" event.
    ///
    /// Returns whether the confirmation locked in. Every rejected event is
    /// dropped silently; a confirmation arriving after the deadline also
    /// expires the session so the window cannot be held open by retries.
    pub fn handle_confirmation(
        &self,
        workspace: WorkspaceId,
        event: &ConfirmationEvent,
        present: &ChannelOccupancy,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        if event.named_is_bot {
            return Ok(false);
        }
        if !self.store.is_host_channel(workspace, event.channel_id)? {
            return Ok(false);
        }
        let Some(session) = self.store.fetch_host_session(workspace, event.channel_id)? else {
            return Ok(false);
        };
        if session.locked || session.timed_out {
            return Ok(false);
        }
        if event.at > session.deadline_at {
            self.store.mark_host_timeout(workspace, event.channel_id)?;
            info!(workspace = %workspace, channel = %event.channel_id, "late confirmation, session expired");
            return Ok(false);
        }
        if !present.contains_human(event.named) {
            return Ok(false);
        }
        if let Some(flags) = self.store.fetch_flags(workspace, event.named)? {
            if flags.is_ineligible() || flags.left_at.is_some() || flags.deleted_at.is_some() {
                return Ok(false);
            }
        }
        self.store
            .confirm_host(workspace, event.channel_id, event.named, now)?;
        info!(workspace = %workspace, channel = %event.channel_id, host = %event.named, "host locked");
        Ok(true)
    }

    /// Award host XP for this tick. A locked session whose host is present
    /// and whose channel holds at least `min_occupancy` non-bot occupants
    /// earns XP equal to the occupant count, plus one session-count bump.
    /// Returns the number of sessions awarded.
    pub fn tick_host_xp(
        &self,
        workspace: WorkspaceId,
        channels: &[ChannelOccupancy],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut awarded = 0;
        for occupancy in channels {
            if !self.store.is_host_channel(workspace, occupancy.channel_id)? {
                continue;
            }
            let Some(session) = self
                .store
                .fetch_host_session(workspace, occupancy.channel_id)?
            else {
                continue;
            };
            let Some(host) = session.host_participant_id.filter(|_| session.locked) else {
                continue;
            };
            if !occupancy.contains_human(host) {
                continue;
            }
            let humans = occupancy.human_count();
            if humans < self.min_occupancy {
                continue;
            }
            if let Some(flags) = self.store.fetch_flags(workspace, host)? {
                if flags.is_ineligible() || flags.left_at.is_some() || flags.deleted_at.is_some() {
                    continue;
                }
            }
            let amount = humans as i64;
            self.store.add_host_xp(workspace, host, amount, now)?;
            self.store.add_host_weekly_xp(workspace, host, amount, now)?;
            self.store.bump_host_session_counts(workspace, host, now)?;
            awarded += 1;
        }
        Ok(awarded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::{Occupant, ParticipantId, PeriodClock};

    const WS: WorkspaceId = WorkspaceId(1);
    const CH: ChannelId = ChannelId(500);
    const HOST: ParticipantId = ParticipantId(42);
    const GUEST: ParticipantId = ParticipantId(43);

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    fn secs(s: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(s)
    }

    fn occupancy(occupants: &[(ParticipantId, bool)]) -> ChannelOccupancy {
        ChannelOccupancy {
            channel_id: CH,
            occupants: occupants
                .iter()
                .map(|&(participant_id, is_bot)| Occupant {
                    participant_id,
                    is_bot,
                })
                .collect(),
        }
    }

    fn tracker() -> (Arc<Store>, HostTracker) {
        let store = Arc::new(Store::open_in_memory(PeriodClock::from_offset_hours(0)).unwrap());
        let tracker = HostTracker::new(store.clone(), 120, 2);
        tracker.handle_channel_created(WS, CH, t0()).unwrap();
        (store, tracker)
    }

    fn named(at: DateTime<Utc>) -> ConfirmationEvent {
        ConfirmationEvent {
            channel_id: CH,
            named: HOST,
            named_is_bot: false,
            at,
        }
    }

    #[test]
    fn confirmed_session_stays_locked_past_the_window() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);

        tracker.observe_channel(WS, &room, t0()).unwrap();
        assert!(tracker.handle_confirmation(WS, &named(secs(30)), &room, secs(30)).unwrap());

        // Ticks long after the 120s window leave the lock alone.
        tracker.observe_channel(WS, &room, secs(200)).unwrap();
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(session.locked);
        assert!(!session.timed_out);
        assert_eq!(session.host_participant_id, Some(HOST));

        let awarded = tracker.tick_host_xp(WS, &[room], secs(200)).unwrap();
        assert_eq!(awarded, 1);
        let record = store.fetch_host_record(WS, HOST).unwrap().unwrap();
        assert_eq!(record.total_xp, 2);
        assert_eq!(record.total_sessions, 1);
    }

    #[test]
    fn unconfirmed_session_times_out_and_never_earns() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);

        tracker.observe_channel(WS, &room, t0()).unwrap();
        tracker.observe_channel(WS, &room, secs(121)).unwrap();
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(session.timed_out);
        assert!(!session.locked);

        // A confirmation after the timeout is dropped.
        assert!(!tracker.handle_confirmation(WS, &named(secs(130)), &room, secs(130)).unwrap());
        assert_eq!(tracker.tick_host_xp(WS, &[room], secs(130)).unwrap(), 0);
        assert!(store.fetch_host_record(WS, HOST).unwrap().is_none());
    }

    #[test]
    fn late_confirmation_expires_the_session_itself() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);
        tracker.observe_channel(WS, &room, t0()).unwrap();

        // No tick marked the timeout yet; the late event must.
        assert!(!tracker.handle_confirmation(WS, &named(secs(121)), &room, secs(121)).unwrap());
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(session.timed_out);
    }

    #[test]
    fn confirmation_guards_reject_bots_absentees_and_ineligible() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);
        tracker.observe_channel(WS, &room, t0()).unwrap();

        let mut bot_event = named(secs(10));
        bot_event.named_is_bot = true;
        assert!(!tracker.handle_confirmation(WS, &bot_event, &room, secs(10)).unwrap());

        // Named participant not in the channel.
        let without_host = occupancy(&[(GUEST, false)]);
        assert!(!tracker.handle_confirmation(WS, &named(secs(10)), &without_host, secs(10)).unwrap());

        store.set_opted_out(WS, HOST, true).unwrap();
        assert!(!tracker.handle_confirmation(WS, &named(secs(10)), &room, secs(10)).unwrap());

        store.set_opted_out(WS, HOST, false).unwrap();
        assert!(tracker.handle_confirmation(WS, &named(secs(10)), &room, secs(10)).unwrap());
    }

    #[test]
    fn below_min_occupancy_earns_nothing() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);
        tracker.observe_channel(WS, &room, t0()).unwrap();
        tracker.handle_confirmation(WS, &named(secs(5)), &room, secs(5)).unwrap();

        // Guest leaves; a lone host earns nothing but stays locked.
        let alone = occupancy(&[(HOST, false)]);
        assert_eq!(tracker.tick_host_xp(WS, &[alone.clone()], secs(60)).unwrap(), 0);
        tracker.observe_channel(WS, &alone, secs(60)).unwrap();
        assert!(store.fetch_host_session(WS, CH).unwrap().unwrap().locked);

        // Bots do not count toward occupancy.
        let with_bot = occupancy(&[(HOST, false), (ParticipantId(9), true)]);
        assert_eq!(tracker.tick_host_xp(WS, &[with_bot], secs(120)).unwrap(), 0);
    }

    #[test]
    fn emptied_channel_discards_the_session() {
        let (store, tracker) = tracker();
        let room = occupancy(&[(HOST, false), (GUEST, false)]);
        tracker.observe_channel(WS, &room, t0()).unwrap();
        tracker.handle_confirmation(WS, &named(secs(5)), &room, secs(5)).unwrap();

        // Snapshot no longer lists the channel at all.
        tracker.reconcile(WS, &[], secs(60)).unwrap();
        assert!(store.fetch_host_session(WS, CH).unwrap().is_none());

        // Re-occupancy opens a fresh window.
        tracker.reconcile(WS, &[room], secs(120)).unwrap();
        let session = store.fetch_host_session(WS, CH).unwrap().unwrap();
        assert!(!session.locked);
        assert_eq!(session.deadline_at, secs(240));
    }
}
