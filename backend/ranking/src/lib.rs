//! `voxrank-ranking` — deterministic leaderboard ordering.
//!
//! All six windows share one sort: XP descending, then earliest
//! `last_earned_at` first (earlier achiever outranks the later one on a
//! tie), then participant id ascending so equal rows still order stably.

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::debug;

use voxrank_core::{RankRow, Window, WorkspaceId};
use voxrank_store::Store;

/// A placed leaderboard entry. `rank` is 1-based and strictly positional;
/// ties share XP but not rank.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RankedEntry {
    pub rank: usize,
    #[serde(flatten)]
    pub row: RankRow,
}

/// Order candidates deterministically and keep the top `limit`.
pub fn rank(mut rows: Vec<RankRow>, limit: usize) -> Vec<RankedEntry> {
    // A never-earned row sorts after every real timestamp.
    let sentinel = DateTime::<Utc>::MAX_UTC;
    rows.sort_by(|a, b| {
        b.xp.cmp(&a.xp)
            .then_with(|| {
                a.last_earned_at
                    .unwrap_or(sentinel)
                    .cmp(&b.last_earned_at.unwrap_or(sentinel))
            })
            .then_with(|| a.participant_id.0.cmp(&b.participant_id.0))
    });
    rows.truncate(limit);
    rows.into_iter()
        .enumerate()
        .map(|(i, row)| RankedEntry { rank: i + 1, row })
        .collect()
}

/// Fetch the candidates for `window` and rank them.
pub fn compute_leaderboard(
    store: &Store,
    workspace: WorkspaceId,
    window: Window,
    limit: usize,
    now: DateTime<Utc>,
) -> Result<Vec<RankedEntry>> {
    let (week_key, month_key) = store.ensure_period_state(workspace, now)?;
    let rows = match window {
        Window::Weekly => store.weekly_candidates(workspace, &week_key)?,
        Window::Monthly => store.monthly_candidates(workspace, &month_key)?,
        Window::Lifetime => store.lifetime_candidates(workspace)?,
        Window::HostWeekly => store.host_weekly_candidates(workspace, &week_key)?,
        Window::HostMonthly => store.host_monthly_candidates(workspace, &month_key)?,
        Window::HostLifetime => store.host_lifetime_candidates(workspace)?,
    };
    let entries = rank(rows, limit);
    debug!(workspace = %workspace, %window, candidates = entries.len(), "leaderboard computed");
    Ok(entries)
}

/// Rank a past week by its key directly (history lookups from the CLI).
pub fn compute_weekly_leaderboard_for_key(
    store: &Store,
    workspace: WorkspaceId,
    week_key: &str,
    host: bool,
    limit: usize,
) -> Result<Vec<RankedEntry>> {
    let rows = if host {
        store.host_weekly_candidates(workspace, week_key)?
    } else {
        store.weekly_candidates(workspace, week_key)?
    };
    Ok(rank(rows, limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use voxrank_core::ParticipantId;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, minute, 0).unwrap()
    }

    fn row(id: u64, xp: i64, earned: Option<DateTime<Utc>>) -> RankRow {
        RankRow {
            participant_id: ParticipantId(id),
            xp,
            last_earned_at: earned,
        }
    }

    #[test]
    fn ties_break_by_earlier_last_earned_then_id() {
        // Same XP: the one who reached it first (earlier timestamp) wins.
        let rows = vec![
            row(1, 50, Some(at(2))),
            row(2, 50, Some(at(1))),
            row(3, 30, Some(at(3))),
        ];
        let ranked = rank(rows, 10);
        let ids: Vec<u64> = ranked.iter().map(|e| e.row.participant_id.0).collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert_eq!(ranked[0].rank, 1);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn never_earned_sorts_last_within_tie() {
        let rows = vec![row(1, 10, None), row(2, 10, Some(at(5)))];
        let ranked = rank(rows, 10);
        assert_eq!(ranked[0].row.participant_id.0, 2);
    }

    #[test]
    fn full_tie_orders_by_id() {
        let rows = vec![row(9, 10, Some(at(1))), row(3, 10, Some(at(1)))];
        let ranked = rank(rows, 10);
        assert_eq!(ranked[0].row.participant_id.0, 3);
    }

    #[test]
    fn limit_truncates_after_sorting() {
        let rows = vec![row(1, 1, None), row(2, 3, None), row(3, 2, None)];
        let ranked = rank(rows, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].row.xp, 3);
        assert_eq!(ranked[1].row.xp, 2);
    }
}
