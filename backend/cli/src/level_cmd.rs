use anyhow::Result;
use serde_json::json;

use voxrank_core::level_progress;

pub fn run(xp: i64) -> Result<()> {
    let (level, current_floor, next_floor, progress) = level_progress(xp);
    let payload = json!({
        "lifetime_xp": xp,
        "level": level,
        "current_level_floor": current_floor,
        "next_level_floor": next_floor,
        "progress": progress,
    });
    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}
