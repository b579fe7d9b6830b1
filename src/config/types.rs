use serde::{Deserialize, Serialize};

pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested when the config names none.
pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/calendar",
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/gmail.compose",
    "https://www.googleapis.com/auth/spreadsheets",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    /// URL-safe base64 AES-256 key for `state` tokens.
    #[serde(default)]
    pub state_key: Option<String>,
    /// Identity used when a caller does not name one.
    #[serde(default)]
    pub default_identity: Option<String>,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default = "default_exchange_timeout_ms")]
    pub exchange_timeout_ms: u64,
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            state_key: None,
            default_identity: None,
            callback: CallbackConfig::default(),
            exchange_timeout_ms: default_exchange_timeout_ms(),
            pending_ttl_secs: default_pending_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    #[serde(default = "default_authorization_endpoint")]
    pub authorization_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            authorization_endpoint: default_authorization_endpoint(),
            token_endpoint: default_token_endpoint(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            scopes: default_scopes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_authorization_endpoint() -> String {
    GOOGLE_AUTHORIZATION_ENDPOINT.to_string()
}

fn default_token_endpoint() -> String {
    GOOGLE_TOKEN_ENDPOINT.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_exchange_timeout_ms() -> u64 {
    10_000
}

fn default_pending_ttl_secs() -> u64 {
    900
}
