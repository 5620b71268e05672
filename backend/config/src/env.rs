//! Environment variable substitution for config values.
//!
//! Supports `${VAR_NAME}` syntax in the raw config text, resolved at load
//! time. Only uppercase `[A-Z_][A-Z0-9_]*` variable names are matched.

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

/// Pattern matching valid uppercase env var names.
static ENV_VAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap());

/// Error returned for missing env vars.
#[derive(Debug, thiserror::Error)]
#[error("Missing env var \"{var_name}\" referenced in config")]
pub struct MissingEnvVarError {
    pub var_name: String,
}

/// Substitute `${VAR}` references in raw config text.
///
/// Returns an error if any referenced env var is not set or is empty.
pub fn resolve_env_vars(text: &str) -> Result<String> {
    resolve_env_vars_with(text, &std::env::vars().collect())
}

/// Substitute env vars using a provided map (useful for testing).
pub fn resolve_env_vars_with(text: &str, env: &HashMap<String, String>) -> Result<String> {
    if !text.contains('$') {
        return Ok(text.to_string());
    }

    let mut error: Option<MissingEnvVarError> = None;
    let substituted = ENV_VAR_PATTERN.replace_all(text, |caps: &regex::Captures| {
        if error.is_some() {
            return String::new();
        }
        let var_name = &caps[1];
        match env.get(var_name) {
            Some(value) if !value.is_empty() => value.clone(),
            _ => {
                error = Some(MissingEnvVarError {
                    var_name: var_name.to_string(),
                });
                String::new()
            }
        }
    });

    match error {
        Some(err) => Err(err.into()),
        None => Ok(substituted.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_vars() {
        let env = HashMap::from([("DB_PATH".to_string(), "/tmp/vox.sqlite".to_string())]);
        let out = resolve_env_vars_with("db_path: ${DB_PATH}", &env).unwrap();
        assert_eq!(out, "db_path: /tmp/vox.sqlite");
    }

    #[test]
    fn missing_var_is_an_error() {
        let env = HashMap::new();
        let err = resolve_env_vars_with("db_path: ${NOPE_VAR}", &env).unwrap_err();
        assert!(err.to_string().contains("NOPE_VAR"));
    }

    #[test]
    fn lowercase_refs_pass_through() {
        let env = HashMap::new();
        let out = resolve_env_vars_with("path: ${not_a_var}", &env).unwrap();
        assert_eq!(out, "path: ${not_a_var}");
    }
}
