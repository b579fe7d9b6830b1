use std::path::{Path, PathBuf};

use crate::error::RelayError;

use super::env::{apply_env_overrides, expand_relay_config};
use super::types::RelayConfig;

pub const CONFIG_PATH_VAR: &str = "OAUTH_RELAY_CONFIG";
const CONFIG_FILE_NAME: &str = "oauth-relay.json";

/// Discover config files in precedence order (highest first).
///
/// Precedence:
/// 1. `--config` CLI flag
/// 2. `OAUTH_RELAY_CONFIG` env var
/// 3. `./config/oauth-relay.json` (project-level)
/// 4. `~/.oauth-relay/oauth-relay.json` (home-level)
pub fn discover_config_files(cli_config: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = cli_config {
        candidates.push(PathBuf::from(path));
    }
    if let Ok(env_path) = std::env::var(CONFIG_PATH_VAR) {
        candidates.push(PathBuf::from(env_path));
    }
    candidates.push(PathBuf::from("./config").join(CONFIG_FILE_NAME));
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".oauth-relay").join(CONFIG_FILE_NAME));
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for path in candidates {
        if path.exists() && !files.contains(&path) {
            files.push(path);
        }
    }
    files
}

/// Parse a single config file.
pub fn load_config_file(path: &Path) -> Result<RelayConfig, RelayError> {
    let content = std::fs::read_to_string(path).map_err(|e| RelayError::ConfigError {
        path: path.to_path_buf(),
        detail: format!("Failed to read: {e}"),
    })?;
    serde_json::from_str(&content).map_err(|e| RelayError::ConfigError {
        path: path.to_path_buf(),
        detail: format!("Invalid JSON: {e}"),
    })
}

/// Load the highest-precedence config, expand env references, apply
/// `OAUTH_RELAY_*` overrides and validate the provider settings.
pub fn load_config(cli_config: Option<&str>) -> Result<RelayConfig, RelayError> {
    if let Some(path) = cli_config {
        if !Path::new(path).exists() {
            return Err(RelayError::ConfigError {
                path: PathBuf::from(path),
                detail: "file does not exist".into(),
            });
        }
    }

    let (mut config, source) = match discover_config_files(cli_config).into_iter().next() {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            (load_config_file(&path)?, path)
        }
        None => (RelayConfig::default(), PathBuf::from("<defaults>")),
    };

    expand_relay_config(&mut config)?;
    apply_env_overrides(&mut config);
    validate(&config, &source)?;
    Ok(config)
}

fn validate(config: &RelayConfig, source: &Path) -> Result<(), RelayError> {
    let fail = |detail: &str| {
        Err(RelayError::ConfigError {
            path: source.to_path_buf(),
            detail: detail.to_string(),
        })
    };
    if config.provider.client_id.trim().is_empty() {
        return fail("provider.clientId is empty (set OAUTH_RELAY_CLIENT_ID)");
    }
    if config.provider.redirect_uri.trim().is_empty() {
        return fail("provider.redirectUri is empty (set OAUTH_RELAY_REDIRECT_URI)");
    }
    if config.provider.scopes.is_empty() {
        return fail("provider.scopes must name at least one scope");
    }
    if config.exchange_timeout_ms == 0 {
        return fail("exchangeTimeoutMs must be positive");
    }
    Ok(())
}
