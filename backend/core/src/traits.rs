//! Collaborator traits consumed by the tick engines.
//!
//! The gateway transport, directory service, role application, and board
//! rendering all live outside this runtime; the engines talk to them only
//! through these traits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::ids::{ChannelId, ParticipantId, WorkspaceId};
use crate::records::{RankRow, Window};

/// One occupant of a voice channel as reported by the presence source.
#[derive(Debug, Clone, Copy)]
pub struct Occupant {
    pub participant_id: ParticipantId,
    pub is_bot: bool,
}

/// Current occupants of one voice channel.
#[derive(Debug, Clone)]
pub struct ChannelOccupancy {
    pub channel_id: ChannelId,
    pub occupants: Vec<Occupant>,
}

impl ChannelOccupancy {
    /// Non-bot occupant count, the "effective occupancy" host XP is gated on.
    pub fn human_count(&self) -> usize {
        self.occupants.iter().filter(|o| !o.is_bot).count()
    }

    pub fn contains_human(&self, participant: ParticipantId) -> bool {
        self.occupants
            .iter()
            .any(|o| o.participant_id == participant && !o.is_bot)
    }
}

/// "Participant X was named in channel Z at time T" from the confirmation
/// event source.
#[derive(Debug, Clone)]
pub struct ConfirmationEvent {
    pub channel_id: ChannelId,
    pub named: ParticipantId,
    pub named_is_bot: bool,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct MemberProfile {
    pub participant_id: ParticipantId,
    pub display_name: String,
}

/// Result of a full membership enumeration. `complete = false` signals a
/// partial failure; callers must not mark absentees as departed.
#[derive(Debug, Clone)]
pub struct MemberEnumeration {
    pub members: Vec<MemberProfile>,
    pub complete: bool,
}

/// Source of truth for who is connected to which voice room.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Full per-channel occupancy snapshot for the workspace.
    async fn snapshot(&self, workspace: WorkspaceId) -> Result<Vec<ChannelOccupancy>>;
}

/// External membership directory.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn enumerate_members(&self, workspace: WorkspaceId) -> Result<MemberEnumeration>;
}

/// Receives `{participant, new_level}` pairs. Dispatched fire-and-forget;
/// the tick never observes the outcome.
#[async_trait]
pub trait RoleGranter: Send + Sync {
    async fn grant(
        &self,
        workspace: WorkspaceId,
        participant: ParticipantId,
        new_level: u32,
    ) -> Result<()>;
}

/// Receives ordered leaderboard entries for rendering/display.
#[async_trait]
pub trait BoardPublisher: Send + Sync {
    async fn publish(
        &self,
        workspace: WorkspaceId,
        window: Window,
        entries: &[RankRow],
    ) -> Result<()>;
}
