//! Tick engines.
//!
//! Every entry point takes an explicit `now` so the run loops, the CLI,
//! and tests all drive the same code path; nothing in here reads the
//! wall clock.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use voxrank_config::VoxrankConfig;
use voxrank_core::{
    level_from_xp, BoardPublisher, ChannelId, ChannelOccupancy, ConfirmationEvent, Directory,
    ParticipantId, PeriodClock, PresenceSource, RoleGranter, Window, WorkspaceId,
};
use voxrank_ranking::compute_leaderboard;
use voxrank_store::{workspace_meta_key, Store};
use voxrank_tracker::{HostTracker, PresenceTracker};

const LAST_MONTHLY_RESET_KEY: &str = "last_monthly_reset_key";
const LAST_HOST_MONTHLY_RESET_KEY: &str = "last_host_monthly_reset_key";

/// What one minute tick did.
#[derive(Debug, Default)]
pub struct MinuteOutcome {
    /// Participants granted voice XP this tick.
    pub updated: usize,
    /// Hosts granted host XP this tick.
    pub host_sessions_awarded: usize,
    /// `(participant, new_level)` pairs that crossed a level boundary.
    pub level_changes: Vec<(ParticipantId, u32)>,
}

pub struct TickEngine {
    store: Arc<Store>,
    presence: PresenceTracker,
    host: HostTracker,
    presence_source: Arc<dyn PresenceSource>,
    directory: Arc<dyn Directory>,
    roles: Arc<dyn RoleGranter>,
    publisher: Arc<dyn BoardPublisher>,
    clock: PeriodClock,
    board_limit: usize,
    weeks_to_keep: u32,
    excluded: Vec<ParticipantId>,
}

impl TickEngine {
    pub fn new(
        store: Arc<Store>,
        presence_source: Arc<dyn PresenceSource>,
        directory: Arc<dyn Directory>,
        roles: Arc<dyn RoleGranter>,
        publisher: Arc<dyn BoardPublisher>,
        config: &VoxrankConfig,
    ) -> Self {
        Self {
            presence: PresenceTracker::new(store.clone()),
            host: HostTracker::new(
                store.clone(),
                config.confirmation_window_secs as i64,
                config.min_host_occupancy,
            ),
            clock: config.clock(),
            board_limit: config.board_limit,
            weeks_to_keep: config.weeks_to_keep,
            excluded: config
                .excluded_participants
                .iter()
                .copied()
                .map(ParticipantId)
                .collect(),
            store,
            presence_source,
            directory,
            roles,
            publisher,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Startup: stored presence from a previous run is stale until the
    /// first snapshot lands.
    pub fn restore(&self, workspace: WorkspaceId) -> Result<usize> {
        self.presence.restore(workspace)
    }

    /// Incremental presence events between snapshots.
    pub fn handle_join(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        is_bot: bool,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.presence.handle_join(workspace, participant, is_bot, now)
    }

    pub fn handle_leave(&self, workspace: WorkspaceId, participant: ParticipantId) -> Result<()> {
        self.presence.handle_leave(workspace, participant)
    }

    pub fn handle_channel_created(
        &self,
        workspace: WorkspaceId,
        channel: ChannelId,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.host.handle_channel_created(workspace, channel, now)
    }

    pub fn handle_channel_deleted(&self, workspace: WorkspaceId, channel: ChannelId) -> Result<()> {
        self.host.handle_channel_deleted(workspace, channel)
    }

    /// Route a host-confirmation event against the current occupancy of
    /// its channel.
    pub async fn handle_confirmation(
        &self,
        workspace: WorkspaceId,
        event: &ConfirmationEvent,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let snapshot = self.presence_source.snapshot(workspace).await?;
        let occupancy = snapshot
            .into_iter()
            .find(|c| c.channel_id == event.channel_id)
            .unwrap_or(ChannelOccupancy {
                channel_id: event.channel_id,
                occupants: Vec::new(),
            });
        self.host.handle_confirmation(workspace, event, &occupancy, now)
    }

    /// One minute tick: reconcile presence and host sessions from a fresh
    /// occupancy snapshot, apply the weekly boundary if one passed, then
    /// grant +1 voice XP per eligible connected participant and the host
    /// XP pass. Per-participant failures are logged and skipped; the tick
    /// itself fails only when the snapshot or the weekly reset does.
    pub async fn tick_minute(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<MinuteOutcome> {
        let snapshot = self.presence_source.snapshot(workspace).await?;
        self.presence.reconcile(workspace, &snapshot, now)?;
        self.host.reconcile(workspace, &snapshot, now)?;
        self.store.ensure_weekly_reset(workspace, now)?;

        let mut outcome = MinuteOutcome::default();
        for (participant, lifetime_xp) in self.store.eligible_connected(workspace)? {
            let granted = self
                .store
                .add_voice_xp(workspace, participant, 1, now)
                .and_then(|_| self.store.add_voice_weekly_xp(workspace, participant, 1, now));
            if let Err(err) = granted {
                warn!(workspace = %workspace, %participant, %err, "voice XP grant skipped");
                continue;
            }
            outcome.updated += 1;

            let old_level = level_from_xp(lifetime_xp);
            let new_level = level_from_xp(lifetime_xp + 1);
            if new_level > old_level {
                outcome.level_changes.push((participant, new_level));
                self.dispatch_role_grant(workspace, participant, new_level);
            }
        }

        outcome.host_sessions_awarded = self.host.tick_host_xp(workspace, &snapshot, now)?;
        Ok(outcome)
    }

    /// Fire-and-forget: the tick never waits on (or observes) the grant.
    fn dispatch_role_grant(&self, workspace: WorkspaceId, participant: ParticipantId, level: u32) {
        let roles = self.roles.clone();
        tokio::spawn(async move {
            if let Err(err) = roles.grant(workspace, participant, level).await {
                warn!(%workspace, %participant, level, %err, "role grant failed");
            }
        });
    }

    /// One hourly tick: period maintenance, directory sync, board
    /// publishing, history pruning. Each phase is independent; a failed
    /// phase is logged and the rest still run.
    pub async fn tick_hourly(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<()> {
        self.store.ensure_weekly_reset(workspace, now)?;
        self.apply_monthly_resets(workspace, now)?;
        self.store.sync_excluded(workspace, &self.excluded)?;

        if let Err(err) = self.sync_member_state(workspace, now).await {
            error!(%workspace, %err, "member sync failed");
        }

        for window in Window::ALL {
            let result = compute_leaderboard(&self.store, workspace, window, self.board_limit, now);
            match result {
                Ok(entries) => {
                    let rows: Vec<_> = entries.into_iter().map(|e| e.row).collect();
                    if let Err(err) = self.publisher.publish(workspace, window, &rows).await {
                        error!(%workspace, %window, %err, "board publish failed");
                    }
                }
                Err(err) => error!(%workspace, %window, %err, "board compute failed"),
            }
        }

        let min_week = self.clock.min_week_key_to_keep(now, self.weeks_to_keep);
        let pruned = self.store.prune_weekly_history(&min_week)?;
        if pruned > 0 {
            info!(%workspace, pruned, %min_week, "weekly history pruned");
        }
        Ok(())
    }

    /// Eager monthly resets, applied only on the first local day of the
    /// month and at most once per month via stored guard keys. The lazy
    /// rollover in the store covers any tick this one misses.
    fn apply_monthly_resets(&self, workspace: WorkspaceId, now: DateTime<Utc>) -> Result<()> {
        if self.clock.local_day_of_month(now) != 1 {
            return Ok(());
        }
        let month_key = self.clock.month_key(now);
        let voice_key = workspace_meta_key(LAST_MONTHLY_RESET_KEY, workspace);
        if self.store.get_meta(&voice_key)?.as_deref() != Some(month_key.as_str()) {
            let rows = self.store.reset_voice_monthly(workspace, now)?;
            self.store.set_meta(&voice_key, &month_key)?;
            info!(%workspace, rows, %month_key, "voice monthly reset applied");
        }
        let host_key = workspace_meta_key(LAST_HOST_MONTHLY_RESET_KEY, workspace);
        if self.store.get_meta(&host_key)?.as_deref() != Some(month_key.as_str()) {
            let rows = self.store.reset_host_monthly(workspace, now)?;
            self.store.set_meta(&host_key, &month_key)?;
            info!(%workspace, rows, %month_key, "host monthly reset applied");
        }
        Ok(())
    }

    pub(crate) fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }
}
