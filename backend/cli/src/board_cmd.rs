use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use chrono::Utc;

use voxrank_config::VoxrankConfig;
use voxrank_core::{Window, WorkspaceId};
use voxrank_ranking::{compute_leaderboard, compute_weekly_leaderboard_for_key};
use voxrank_store::Store;

pub fn run(
    config: &VoxrankConfig,
    window: &str,
    limit: Option<usize>,
    week: Option<&str>,
) -> Result<()> {
    let window = Window::from_str(window).map_err(|e| anyhow!(e))?;
    let store = Store::open(Path::new(&config.db_path), config.clock())?;
    let workspace = WorkspaceId(config.workspace_id);
    let limit = limit.unwrap_or(config.board_limit);

    let entries = match week {
        Some(week) => {
            let week_key = config
                .clock()
                .normalize_week_key(week)
                .ok_or_else(|| anyhow!("invalid week: {week}"))?;
            let host = match window {
                Window::Weekly => false,
                Window::HostWeekly => true,
                other => return Err(anyhow!("--week only applies to weekly windows, got {other}")),
            };
            compute_weekly_leaderboard_for_key(&store, workspace, &week_key, host, limit)?
        }
        None => compute_leaderboard(&store, workspace, window, limit, Utc::now())?,
    };

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
