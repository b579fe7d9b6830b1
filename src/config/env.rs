use crate::error::RelayError;

use super::types::RelayConfig;

pub const STATE_KEY_VAR: &str = "OAUTH_RELAY_STATE_KEY";
pub const CLIENT_ID_VAR: &str = "OAUTH_RELAY_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "OAUTH_RELAY_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "OAUTH_RELAY_REDIRECT_URI";
pub const DEFAULT_IDENTITY_VAR: &str = "OAUTH_RELAY_DEFAULT_IDENTITY";

/// Expand environment variable references in a string.
///
/// Supported syntaxes:
/// - `${VAR}` - replaced with env var value; error if unset
/// - `${VAR:-fallback}` - replaced with env var value, or fallback if unset or empty
/// - `$env:VAR` - same as `${VAR}`
pub fn expand_env_vars(input: &str) -> Result<String, RelayError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find('$') {
        result.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        if let Some(body) = after.strip_prefix('{') {
            let close = body.find('}').ok_or_else(|| {
                env_error(&format!("Unclosed variable reference: ${{{body}"))
            })?;
            let var_expr = &body[..close];
            match var_expr.split_once(":-") {
                Some((name, fallback)) => match std::env::var(name) {
                    Ok(val) if !val.is_empty() => result.push_str(&val),
                    _ => result.push_str(fallback),
                },
                None => result.push_str(&require_var(var_expr)?),
            }
            rest = &body[close + 1..];
        } else if let Some(body) = after.strip_prefix("env:") {
            let end = body
                .find(|c: char| !(c.is_alphanumeric() || c == '_'))
                .unwrap_or(body.len());
            if end == 0 {
                return Err(env_error("Empty variable name in $env: reference"));
            }
            result.push_str(&require_var(&body[..end])?);
            rest = &body[end..];
        } else {
            result.push('$');
            rest = after;
        }
    }
    result.push_str(rest);

    Ok(result)
}

fn require_var(name: &str) -> Result<String, RelayError> {
    std::env::var(name)
        .map_err(|_| env_error(&format!("Environment variable '{name}' is not set")))
}

/// Expand environment references in every string field that may carry secrets or URLs.
pub fn expand_relay_config(config: &mut RelayConfig) -> Result<(), RelayError> {
    let provider = &mut config.provider;
    for field in [
        &mut provider.authorization_endpoint,
        &mut provider.token_endpoint,
        &mut provider.client_id,
        &mut provider.client_secret,
        &mut provider.redirect_uri,
        &mut config.callback.bind,
    ] {
        *field = expand_env_vars(field)?;
    }
    for scope in &mut provider.scopes {
        *scope = expand_env_vars(scope)?;
    }
    if let Some(ref mut key) = config.state_key {
        *key = expand_env_vars(key)?;
    }
    if let Some(ref mut identity) = config.default_identity {
        *identity = expand_env_vars(identity)?;
    }
    Ok(())
}

/// Let `OAUTH_RELAY_*` variables override whatever the config file said.
pub fn apply_env_overrides(config: &mut RelayConfig) {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

    if let Some(key) = var(STATE_KEY_VAR) {
        config.state_key = Some(key);
    }
    if let Some(id) = var(CLIENT_ID_VAR) {
        config.provider.client_id = id;
    }
    if let Some(secret) = var(CLIENT_SECRET_VAR) {
        config.provider.client_secret = secret;
    }
    if let Some(uri) = var(REDIRECT_URI_VAR) {
        config.provider.redirect_uri = uri;
    }
    if let Some(identity) = var(DEFAULT_IDENTITY_VAR) {
        config.default_identity = Some(identity);
    }
}

fn env_error(detail: &str) -> RelayError {
    RelayError::ConfigError {
        path: std::path::PathBuf::from("<env>"),
        detail: detail.to_string(),
    }
}
