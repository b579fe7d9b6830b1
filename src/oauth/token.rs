use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::RelayError;

/// Delegated-access grant for one identity.
#[derive(Serialize, Deserialize, Clone, PartialEq)]
pub struct Credential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    pub token_type: String,
    #[serde(default)]
    pub scope: Option<String>,
}

impl Credential {
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => chrono::Utc::now() >= expires,
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Raw token response from the OAuth server.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    #[serde(default = "default_token_type")]
    token_type: String,
    scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl TokenResponse {
    fn into_credential(self) -> Credential {
        let expires_at = self
            .expires_in
            .map(|secs| chrono::Utc::now() + chrono::Duration::seconds(secs));
        Credential {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            token_type: self.token_type,
            scope: self.scope,
        }
    }
}

/// Trades an authorization code for a [`Credential`].
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, code: &str) -> Result<Credential, RelayError>;
}

/// Exchanges codes against the provider's token endpoint over HTTP.
pub struct HttpTokenExchanger {
    client: reqwest::Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    timeout: Duration,
}

impl HttpTokenExchanger {
    pub fn new(provider: &ProviderConfig, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            token_endpoint: provider.token_endpoint.clone(),
            client_id: provider.client_id.clone(),
            client_secret: provider.client_secret.clone(),
            redirect_uri: provider.redirect_uri.clone(),
            timeout,
        }
    }

    async fn request(&self, code: &str) -> Result<Credential, RelayError> {
        let resp = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| RelayError::TokenExchange(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::TokenExchange(format!(
                "status {status}: {body}"
            )));
        }

        let token_resp: TokenResponse = resp.json().await.map_err(|e| {
            RelayError::TokenExchange(format!("failed to parse token response: {e}"))
        })?;

        Ok(token_resp.into_credential())
    }
}

#[async_trait]
impl TokenExchanger for HttpTokenExchanger {
    async fn exchange(&self, code: &str) -> Result<Credential, RelayError> {
        tokio::time::timeout(self.timeout, self.request(code))
            .await
            .map_err(|_| RelayError::Timeout {
                duration: self.timeout,
            })?
    }
}
