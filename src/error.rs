use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

/// Why a cached credential cannot be handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// Nothing was ever stored for the identity.
    Missing,
    /// A credential is stored but its expiry has passed.
    Expired,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::Missing => f.write_str("no credential stored"),
            Unavailable::Expired => f.write_str("credential expired"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid state token: {0}")]
    InvalidToken(String),

    #[error("Malformed callback: {0}")]
    MalformedCallback(String),

    #[error("No usable credential for '{identity}': {reason}")]
    CredentialUnavailable {
        identity: String,
        reason: Unavailable,
    },

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token exchange timed out after {}s", .duration.as_secs())]
    Timeout { duration: Duration },

    #[error("State key unusable: {0}")]
    KeyInitialization(String),

    #[error("Authorization declined: {0}")]
    Declined(String),

    #[error("No identity given and no default identity configured")]
    MissingIdentity,

    #[error("No paused action for correlation id {0}")]
    UnknownCorrelation(Uuid),

    #[error("Could not deliver authorization link: {0}")]
    Messaging(String),

    #[error("Error in config {}: {detail}", path.display())]
    ConfigError { path: PathBuf, detail: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RelayError {
    /// Error code string for structured JSON output.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidToken(_) => "invalid_token",
            RelayError::MalformedCallback(_) => "malformed_callback",
            RelayError::CredentialUnavailable { .. } => "credential_unavailable",
            RelayError::TokenExchange(_) => "token_exchange_failed",
            RelayError::Timeout { .. } => "timeout",
            RelayError::KeyInitialization(_) => "key_initialization",
            RelayError::Declined(_) => "access_denied",
            RelayError::MissingIdentity => "missing_identity",
            RelayError::UnknownCorrelation(_) => "unknown_correlation",
            RelayError::Messaging(_) => "messaging_error",
            RelayError::ConfigError { .. } => "config_error",
            RelayError::IoError(_) => "io_error",
        }
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            RelayError::CredentialUnavailable { identity, .. } => Some(identity),
            _ => None,
        }
    }

    /// Whether the caller must begin a fresh authorization instead of failing.
    pub fn needs_authorization(&self) -> bool {
        matches!(self, RelayError::CredentialUnavailable { .. })
    }

    /// Produce a structured JSON error object.
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(identity) = self.identity() {
            obj.insert("identity".into(), serde_json::Value::String(identity.to_string()));
        }
        obj.insert("message".into(), serde_json::Value::String(self.to_string()));
        obj.insert("code".into(), serde_json::Value::String(self.code().to_string()));
        serde_json::json!({ "error": obj })
    }
}
