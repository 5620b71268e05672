//! VoxRank runtime configuration schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use voxrank_core::{PeriodClock, VoxError};

/// Root configuration for the VoxRank runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VoxrankConfig {
    /// The workspace this process owns. Exactly one process drives the tick
    /// engines for a given workspace.
    pub workspace_id: u64,

    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whole-hour UTC offset of the workspace-local timezone.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Host-confirmation window, seconds.
    #[serde(default = "default_confirmation_window_secs")]
    pub confirmation_window_secs: u64,

    /// Weekly history retention, in weeks.
    #[serde(default = "default_weeks_to_keep")]
    pub weeks_to_keep: u32,

    /// Entries per leaderboard.
    #[serde(default = "default_board_limit")]
    pub board_limit: usize,

    /// Minimum non-bot occupancy before a locked host session earns XP.
    #[serde(default = "default_min_host_occupancy")]
    pub min_host_occupancy: usize,

    /// Participants administratively excluded from XP and boards.
    #[serde(default)]
    pub excluded_participants: Vec<u64>,

    /// Level thresholds to role ids, for the external role-grant
    /// collaborator. Absent means the feature is not configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level_roles: Option<BTreeMap<u32, u64>>,
}

impl Default for VoxrankConfig {
    fn default() -> Self {
        Self {
            workspace_id: 0,
            db_path: default_db_path(),
            data_dir: default_data_dir(),
            log_dir: default_log_dir(),
            log_level: default_log_level(),
            utc_offset_hours: default_utc_offset_hours(),
            confirmation_window_secs: default_confirmation_window_secs(),
            weeks_to_keep: default_weeks_to_keep(),
            board_limit: default_board_limit(),
            min_host_occupancy: default_min_host_occupancy(),
            excluded_participants: Vec::new(),
            level_roles: None,
        }
    }
}

impl VoxrankConfig {
    /// Build from env-variable overrides over defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            workspace_id: env_parse("VOXRANK_WORKSPACE_ID", defaults.workspace_id),
            db_path: env_or("VOXRANK_DB_PATH", defaults.db_path),
            data_dir: env_or("VOXRANK_DATA_DIR", defaults.data_dir),
            log_dir: env_or("VOXRANK_LOG_DIR", defaults.log_dir),
            log_level: env_or("VOXRANK_LOG_LEVEL", defaults.log_level),
            utc_offset_hours: env_parse("VOXRANK_UTC_OFFSET_HOURS", defaults.utc_offset_hours),
            confirmation_window_secs: env_parse(
                "VOXRANK_CONFIRMATION_WINDOW_SECS",
                defaults.confirmation_window_secs,
            ),
            weeks_to_keep: env_parse("VOXRANK_WEEKS_TO_KEEP", defaults.weeks_to_keep),
            board_limit: env_parse("VOXRANK_BOARD_LIMIT", defaults.board_limit),
            min_host_occupancy: env_parse(
                "VOXRANK_MIN_HOST_OCCUPANCY",
                defaults.min_host_occupancy,
            ),
            ..defaults
        }
    }

    /// The workspace-local period clock.
    pub fn clock(&self) -> PeriodClock {
        PeriodClock::from_offset_hours(self.utc_offset_hours)
    }

    /// Role id for a level: the highest configured threshold at or below
    /// `level`. Reports `NotConfigured` when no thresholds are set, and
    /// `None` when the level is below every threshold.
    pub fn role_for_level(&self, level: u32) -> Result<Option<u64>, VoxError> {
        let roles = self
            .level_roles
            .as_ref()
            .ok_or_else(|| VoxError::NotConfigured("level_roles".to_string()))?;
        Ok(roles
            .range(..=level)
            .next_back()
            .map(|(_, role_id)| *role_id))
    }
}

fn env_or(name: &str, fallback: String) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(fallback)
}

fn env_parse<T: std::str::FromStr>(name: &str, fallback: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

fn default_db_path() -> String {
    format!("{}/voxrank.sqlite", default_data_dir())
}

fn default_data_dir() -> String {
    dirs::data_dir()
        .map(|d| d.join("voxrank").display().to_string())
        .unwrap_or_else(|| "./data".to_string())
}

fn default_log_dir() -> String {
    format!("{}/logs", default_data_dir())
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_utc_offset_hours() -> i32 {
    9
}

fn default_confirmation_window_secs() -> u64 {
    120
}

fn default_weeks_to_keep() -> u32 {
    12
}

fn default_board_limit() -> usize {
    20
}

fn default_min_host_occupancy() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_on_sparse_yaml() {
        let config: VoxrankConfig = serde_yaml::from_str("workspace_id: 42").unwrap();
        assert_eq!(config.workspace_id, 42);
        assert_eq!(config.confirmation_window_secs, 120);
        assert_eq!(config.weeks_to_keep, 12);
        assert_eq!(config.board_limit, 20);
        assert_eq!(config.min_host_occupancy, 2);
        assert!(config.level_roles.is_none());
    }

    #[test]
    fn role_for_level_reports_not_configured() {
        let config = VoxrankConfig::default();
        let err = config.role_for_level(5).unwrap_err();
        assert!(matches!(err, VoxError::NotConfigured(_)));
    }

    #[test]
    fn role_for_level_picks_highest_threshold() {
        let config = VoxrankConfig {
            level_roles: Some(BTreeMap::from([(2, 100), (5, 200), (10, 300)])),
            ..VoxrankConfig::default()
        };
        assert_eq!(config.role_for_level(1).unwrap(), None);
        assert_eq!(config.role_for_level(2).unwrap(), Some(100));
        assert_eq!(config.role_for_level(7).unwrap(), Some(200));
        assert_eq!(config.role_for_level(12).unwrap(), Some(300));
    }
}
