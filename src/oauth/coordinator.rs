use std::sync::Arc;

use uuid::Uuid;

use crate::config::ProviderConfig;
use crate::error::RelayError;
use crate::oauth::query::urlencoded;
use crate::oauth::state::{CorrelationRecord, StateCodec};
use crate::oauth::store::CredentialStore;
use crate::oauth::token::{Credential, TokenExchanger};

/// An authorization URL ready to hand to the user, and the id the paused
/// action must be filed under.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub correlation_id: Uuid,
}

/// Result of a successfully completed callback.
#[derive(Debug, Clone)]
pub struct Completion {
    pub correlation_id: Uuid,
    pub identity: String,
    pub credential: Credential,
}

/// Drives the redirect handshake: mints `state` tokens on the way out and
/// reconciles them with stored credentials on the way back.
pub struct AuthorizationCoordinator {
    provider: ProviderConfig,
    codec: StateCodec,
    store: Arc<CredentialStore>,
    exchanger: Arc<dyn TokenExchanger>,
}

impl AuthorizationCoordinator {
    pub fn new(
        provider: ProviderConfig,
        codec: StateCodec,
        store: Arc<CredentialStore>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Self {
        Self {
            provider,
            codec,
            store,
            exchanger,
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Start a handshake for `identity`. Never touches the credential store.
    pub fn begin_authorization(&self, identity: &str) -> Result<AuthorizationRequest, RelayError> {
        let record = CorrelationRecord::new(identity);
        let state = self.codec.encode(&record)?;
        let url = self.authorization_url(&state);

        tracing::info!(
            identity,
            correlation_id = %record.correlation_id,
            "authorization requested"
        );

        Ok(AuthorizationRequest {
            url,
            correlation_id: record.correlation_id,
        })
    }

    /// Finish a handshake from the provider's callback parameters.
    ///
    /// The `state` is authenticated before the code is exchanged, so a forged
    /// or corrupted callback is rejected without contacting the provider and
    /// without storing anything. Neither failure is retried.
    pub async fn complete_authorization(
        &self,
        code: &str,
        state: &str,
    ) -> Result<Completion, RelayError> {
        let record = self.codec.decode(state).map_err(|e| {
            tracing::warn!(error = %e, "rejected callback with invalid state");
            e
        })?;

        let credential = self.exchanger.exchange(code).await.map_err(|e| {
            tracing::error!(
                identity = %record.identity,
                correlation_id = %record.correlation_id,
                error = %e,
                "token exchange failed"
            );
            e
        })?;

        self.store.put(&record.identity, credential.clone()).await;
        tracing::info!(
            identity = %record.identity,
            correlation_id = %record.correlation_id,
            "authorization completed"
        );

        Ok(Completion {
            correlation_id: record.correlation_id,
            identity: record.identity,
            credential,
        })
    }

    /// Decode a `state` without storing anything, e.g. when the user denied consent.
    pub fn correlation_of(&self, state: &str) -> Result<CorrelationRecord, RelayError> {
        self.codec.decode(state)
    }

    fn authorization_url(&self, state: &str) -> String {
        let separator = if self.provider.authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!(
            "{}{separator}response_type=code&client_id={}&redirect_uri={}&scope={}&access_type=offline&prompt=consent&state={}",
            self.provider.authorization_endpoint,
            urlencoded(&self.provider.client_id),
            urlencoded(&self.provider.redirect_uri),
            urlencoded(&self.provider.scopes.join(" ")),
            urlencoded(state),
        )
    }
}
