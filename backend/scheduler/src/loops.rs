//! Drift-corrected run loops.
//!
//! Each iteration sleeps to the next boundary computed from the wall
//! clock, so a slow tick shortens the following sleep instead of letting
//! the schedule drift. A failed tick is logged under a per-run id and the
//! loop continues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error};
use uuid::Uuid;

use voxrank_core::WorkspaceId;

use crate::engine::TickEngine;

/// Seconds until the next minute boundary, never less than one.
pub fn secs_until_next_minute(epoch_secs: i64) -> u64 {
    (60 - epoch_secs.rem_euclid(60)).max(1) as u64
}

/// Seconds until the next hour boundary, never less than one.
pub fn secs_until_next_hour(epoch_secs: i64) -> u64 {
    (3600 - epoch_secs.rem_euclid(3600)).max(1) as u64
}

pub async fn run_minute_loop(engine: Arc<TickEngine>, workspace: WorkspaceId) {
    loop {
        let sleep = secs_until_next_minute(Utc::now().timestamp());
        tokio::time::sleep(Duration::from_secs(sleep)).await;

        let run_id = Uuid::new_v4();
        match engine.tick_minute(workspace, Utc::now()).await {
            Ok(outcome) => debug!(
                %run_id,
                %workspace,
                updated = outcome.updated,
                host_sessions = outcome.host_sessions_awarded,
                level_changes = outcome.level_changes.len(),
                "minute tick"
            ),
            Err(err) => error!(%run_id, %workspace, %err, "minute tick failed"),
        }
    }
}

pub async fn run_hourly_loop(engine: Arc<TickEngine>, workspace: WorkspaceId) {
    loop {
        let sleep = secs_until_next_hour(Utc::now().timestamp());
        tokio::time::sleep(Duration::from_secs(sleep)).await;

        let run_id = Uuid::new_v4();
        match engine.tick_hourly(workspace, Utc::now()).await {
            Ok(()) => debug!(%run_id, %workspace, "hourly tick"),
            Err(err) => error!(%run_id, %workspace, %err, "hourly tick failed"),
        }
    }
}
