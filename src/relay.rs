use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::messaging::MessageSink;
use crate::oauth::{
    AuthorizationCoordinator, Credential, CredentialStore, HttpTokenExchanger, StateCodec,
    TokenExchanger,
};
use crate::pending::{PendingAction, PendingActions};

/// What a triggering action gets back when it asks for a credential.
#[derive(Debug, Clone)]
pub enum Access {
    /// A usable credential; proceed with the action.
    Granted(Credential),
    /// The action was paused and an authorization link was sent.
    Pending { identity: String, correlation_id: Uuid },
}

/// A paused action, ready to be retried with its fresh credential.
#[derive(Debug, Clone)]
pub struct Resumed {
    pub correlation_id: Uuid,
    pub identity: String,
    pub action: PendingAction,
    pub credential: Credential,
}

/// Ties the coordinator to the paused-action registry and the messaging surface.
pub struct Relay {
    coordinator: AuthorizationCoordinator,
    pending: PendingActions,
    sink: Arc<dyn MessageSink>,
    default_identity: Option<String>,
    pending_ttl: chrono::Duration,
}

impl Relay {
    pub fn new(
        coordinator: AuthorizationCoordinator,
        sink: Arc<dyn MessageSink>,
        default_identity: Option<String>,
    ) -> Self {
        Self {
            coordinator,
            pending: PendingActions::new(),
            sink,
            default_identity: default_identity.filter(|id| !id.trim().is_empty()),
            pending_ttl: chrono::Duration::minutes(15),
        }
    }

    /// Build a relay from loaded configuration, exchanging codes over HTTP.
    ///
    /// Fails with [`RelayError::KeyInitialization`] when the state key is
    /// missing or malformed; no relay exists without a usable key.
    pub fn from_config(config: &RelayConfig, sink: Arc<dyn MessageSink>) -> Result<Self, RelayError> {
        let exchanger = HttpTokenExchanger::new(
            &config.provider,
            Duration::from_millis(config.exchange_timeout_ms),
        );
        Self::with_exchanger(config, sink, Arc::new(exchanger))
    }

    pub fn with_exchanger(
        config: &RelayConfig,
        sink: Arc<dyn MessageSink>,
        exchanger: Arc<dyn TokenExchanger>,
    ) -> Result<Self, RelayError> {
        let codec = StateCodec::from_key_material(config.state_key.as_deref().unwrap_or(""))?;
        tracing::info!(key_fingerprint = codec.fingerprint(), "state key loaded");

        let coordinator = AuthorizationCoordinator::new(
            config.provider.clone(),
            codec,
            Arc::new(CredentialStore::new()),
            exchanger,
        );
        let ttl_secs = i64::try_from(config.pending_ttl_secs).unwrap_or(i64::MAX);
        Ok(Self::new(coordinator, sink, config.default_identity.clone())
            .with_pending_ttl(chrono::Duration::seconds(ttl_secs)))
    }

    pub fn with_pending_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        self.coordinator.store()
    }

    pub fn pending(&self) -> &PendingActions {
        &self.pending
    }

    pub fn coordinator(&self) -> &AuthorizationCoordinator {
        &self.coordinator
    }

    /// The explicit identity, or the configured default.
    pub fn resolve_identity(&self, identity: Option<&str>) -> Result<String, RelayError> {
        identity
            .filter(|id| !id.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.default_identity.clone())
            .ok_or(RelayError::MissingIdentity)
    }

    /// Hand out a usable credential, or pause `action` and send the identity
    /// an authorization link.
    pub async fn credential_for(
        &self,
        identity: Option<&str>,
        action: PendingAction,
    ) -> Result<Access, RelayError> {
        let identity = self.resolve_identity(identity)?;

        match self.store().require(&identity).await {
            Ok(credential) => return Ok(Access::Granted(credential)),
            Err(e) if e.needs_authorization() => {
                tracing::info!(identity = %identity, intent = %action.intent, reason = %e, "pausing action for authorization");
            }
            Err(e) => return Err(e),
        }

        let request = self.coordinator.begin_authorization(&identity)?;
        self.pending.insert(request.correlation_id, action).await;

        if let Err(e) = self
            .sink
            .deliver_authorization_link(&identity, &request.url)
            .await
        {
            self.pending.take(&request.correlation_id).await;
            tracing::error!(identity = %identity, correlation_id = %request.correlation_id, error = %e, "authorization link not delivered");
            return Err(e);
        }

        Ok(Access::Pending {
            identity,
            correlation_id: request.correlation_id,
        })
    }

    /// Complete the handshake from a callback and release the paused action.
    ///
    /// The credential is stored even when the paused action has already aged
    /// out; the caller then gets [`RelayError::UnknownCorrelation`].
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<Resumed, RelayError> {
        let completion = self.coordinator.complete_authorization(code, state).await?;

        let Some(action) = self.pending.take(&completion.correlation_id).await else {
            tracing::warn!(
                identity = %completion.identity,
                correlation_id = %completion.correlation_id,
                "credential stored but no paused action to resume"
            );
            return Err(RelayError::UnknownCorrelation(completion.correlation_id));
        };

        tracing::info!(
            identity = %completion.identity,
            correlation_id = %completion.correlation_id,
            intent = %action.intent,
            "resuming paused action"
        );
        Ok(Resumed {
            correlation_id: completion.correlation_id,
            identity: completion.identity,
            action,
            credential: completion.credential,
        })
    }

    /// Drop the paused action behind `state`, e.g. when the user declined consent.
    pub async fn abandon(&self, state: &str) -> Result<Option<PendingAction>, RelayError> {
        let record = self.coordinator.correlation_of(state)?;
        let action = self.pending.take(&record.correlation_id).await;
        tracing::info!(
            identity = %record.identity,
            correlation_id = %record.correlation_id,
            found = action.is_some(),
            "authorization abandoned"
        );
        Ok(action)
    }

    /// Age out paused actions older than the configured TTL.
    pub async fn prune_pending(&self) -> usize {
        self.pending.prune(self.pending_ttl).await
    }
}
