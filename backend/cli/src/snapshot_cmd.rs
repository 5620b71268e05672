use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use voxrank_config::VoxrankConfig;
use voxrank_core::WorkspaceId;
use voxrank_store::Store;

pub fn run(config: &VoxrankConfig) -> Result<()> {
    let store = Store::open(Path::new(&config.db_path), config.clock())?;
    let snapshot = store.debug_snapshot(WorkspaceId(config.workspace_id), Utc::now())?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
