use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{RelayError, Unavailable};
use crate::oauth::token::Credential;

/// Outcome of looking up an identity's credential.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Usable(Credential),
    Unusable(Unavailable),
}

/// Process-wide, in-memory cache of credentials keyed by identity.
///
/// A single lock guards the whole map. Credentials are never handed out once
/// their expiry has passed, even though they stay in the map until replaced.
#[derive(Debug, Default)]
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, Credential>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, identity: &str) -> Lookup {
        let credentials = self.credentials.read().await;
        let Some(credential) = credentials.get(identity) else {
            return Lookup::Unusable(Unavailable::Missing);
        };
        if credential.is_expired() {
            return Lookup::Unusable(Unavailable::Expired);
        }
        Lookup::Usable(credential.clone())
    }

    /// The credential for `identity`, or `None` when absent or expired.
    pub async fn get(&self, identity: &str) -> Option<Credential> {
        match self.lookup(identity).await {
            Lookup::Usable(credential) => Some(credential),
            Lookup::Unusable(_) => None,
        }
    }

    /// Like [`get`](Self::get), but reports why nothing usable was found.
    pub async fn require(&self, identity: &str) -> Result<Credential, RelayError> {
        match self.lookup(identity).await {
            Lookup::Usable(credential) => Ok(credential),
            Lookup::Unusable(reason) => Err(RelayError::CredentialUnavailable {
                identity: identity.to_string(),
                reason,
            }),
        }
    }

    /// Replace whatever was stored for `identity`.
    pub async fn put(&self, identity: &str, credential: Credential) {
        self.credentials
            .write()
            .await
            .insert(identity.to_string(), credential);
        tracing::debug!(identity, "credential stored");
    }

    pub async fn len(&self) -> usize {
        self.credentials.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.credentials.read().await.is_empty()
    }
}
