//! Typed entity records for the counter store.
//!
//! Each persisted entity gets an explicit struct so field presence is a
//! compile-time property rather than a runtime column lookup.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ChannelId, ParticipantId};

/// Voice XP counters for one (workspace, participant).
///
/// `monthly_xp` is valid only while `monthly_key` matches the current month
/// key; writes observing a newer key zero the counter first (lazy rollover).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceXpRecord {
    pub participant_id: ParticipantId,
    pub lifetime_xp: i64,
    pub monthly_xp: i64,
    pub monthly_key: String,
    pub weekly_xp: i64,
    pub weekly_key: String,
    pub last_earned_at: Option<DateTime<Utc>>,
}

/// Host XP counters for one (workspace, participant). Mirrors the voice
/// windows plus per-window session counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostXpRecord {
    pub participant_id: ParticipantId,
    pub total_xp: i64,
    pub monthly_xp: i64,
    pub monthly_key: String,
    pub weekly_xp: i64,
    pub weekly_key: String,
    pub total_sessions: i64,
    pub monthly_sessions: i64,
    pub weekly_sessions: i64,
    pub last_earned_at: Option<DateTime<Utc>>,
}

/// Whether a participant currently holds a voice connection.
/// `connected_since` is non-null iff `is_connected`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicePresenceRecord {
    pub participant_id: ParticipantId,
    pub is_connected: bool,
    pub connected_since: Option<DateTime<Utc>>,
}

/// Host-confirmation session for one trackable channel.
///
/// At most one of `locked` / `timed_out` is set; `host_participant_id` is
/// non-null only while `locked`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSessionRecord {
    pub channel_id: ChannelId,
    pub session_started_at: DateTime<Utc>,
    pub deadline_at: DateTime<Utc>,
    pub host_participant_id: Option<ParticipantId>,
    pub locked: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub timed_out: bool,
}

/// Current period keys for a workspace — the single source of truth the
/// lazy-rollover checks compare against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodState {
    pub current_week_key: String,
    pub current_month_key: String,
    pub updated_at: DateTime<Utc>,
}

/// Eligibility flags for a participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantFlags {
    pub opted_out: bool,
    pub excluded: bool,
    pub rank_visible: bool,
    pub left_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ParticipantFlags {
    /// Participants who opted out or were administratively excluded never
    /// earn XP and never appear on boards.
    pub fn is_ineligible(&self) -> bool {
        self.opted_out || self.excluded
    }
}

/// Directory membership state cached from the external directory service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberState {
    Unknown,
    Active,
    Left,
}

impl MemberState {
    pub fn as_i64(self) -> i64 {
        match self {
            MemberState::Unknown => 0,
            MemberState::Active => 1,
            MemberState::Left => 2,
        }
    }

    pub fn from_i64(value: i64) -> Self {
        match value {
            1 => MemberState::Active,
            2 => MemberState::Left,
            _ => MemberState::Unknown,
        }
    }
}

/// One leaderboard candidate row, already filtered for eligibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankRow {
    pub participant_id: ParticipantId,
    pub xp: i64,
    pub last_earned_at: Option<DateTime<Utc>>,
}

/// Leaderboard time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Weekly,
    Monthly,
    Lifetime,
    HostWeekly,
    HostMonthly,
    HostLifetime,
}

impl Window {
    pub const ALL: [Window; 6] = [
        Window::Weekly,
        Window::Monthly,
        Window::Lifetime,
        Window::HostWeekly,
        Window::HostMonthly,
        Window::HostLifetime,
    ];
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Window::Weekly => "weekly",
            Window::Monthly => "monthly",
            Window::Lifetime => "lifetime",
            Window::HostWeekly => "host-weekly",
            Window::HostMonthly => "host-monthly",
            Window::HostLifetime => "host-lifetime",
        };
        f.write_str(name)
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Window::Weekly),
            "monthly" => Ok(Window::Monthly),
            "lifetime" => Ok(Window::Lifetime),
            "host-weekly" => Ok(Window::HostWeekly),
            "host-monthly" => Ok(Window::HostMonthly),
            "host-lifetime" => Ok(Window::HostLifetime),
            other => Err(format!("unknown window: {other}")),
        }
    }
}
