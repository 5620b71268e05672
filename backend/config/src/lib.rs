//! `voxrank-config` — VoxRank runtime configuration.
//!
//! Provides:
//! - Typed config schema with defaulted fields
//! - YAML read with `${ENV_VAR}` substitution
//! - Env-only fallback loading for containerized deployments

pub mod env;
pub mod schema;

pub use env::{resolve_env_vars, MissingEnvVarError};
pub use schema::VoxrankConfig;

use std::path::Path;

use anyhow::{Context, Result};

/// Load a config file, substituting `${VAR}` references before parsing.
///
/// This is the main entry point for loading a config at runtime.
pub fn load_config(path: &Path) -> Result<VoxrankConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    let resolved = resolve_env_vars(&raw)?;
    let config: VoxrankConfig =
        serde_yaml::from_str(&resolved).context("parse config YAML")?;
    Ok(config)
}

/// Load from `VOXRANK_CONFIG` if set, otherwise fall back to env-variable
/// overrides over defaults.
pub fn load_or_default() -> Result<VoxrankConfig> {
    if let Ok(path) = std::env::var("VOXRANK_CONFIG") {
        return load_config(Path::new(&path));
    }
    Ok(VoxrankConfig::from_env())
}
