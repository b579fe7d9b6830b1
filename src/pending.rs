use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Snapshot of an action interrupted because its identity had to authorize first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Which intent was requested (e.g. `send-email`).
    pub intent: String,
    /// The originating request, as received.
    #[serde(default)]
    pub context: serde_json::Value,
    /// Values extracted from the request that the retry needs.
    #[serde(default)]
    pub parameters: serde_json::Value,
}

impl PendingAction {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            context: serde_json::Value::Null,
            parameters: serde_json::Value::Null,
        }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

struct Entry {
    action: PendingAction,
    created_at: DateTime<Utc>,
}

/// Paused actions waiting for their authorization callback, keyed by correlation id.
#[derive(Default)]
pub struct PendingActions {
    entries: Mutex<HashMap<Uuid, Entry>>,
}

impl PendingActions {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, correlation_id: Uuid, action: PendingAction) {
        self.entries.lock().await.insert(
            correlation_id,
            Entry {
                action,
                created_at: Utc::now(),
            },
        );
    }

    /// Remove and return the action, so it is resumed at most once.
    pub async fn take(&self, correlation_id: &Uuid) -> Option<PendingAction> {
        self.entries
            .lock()
            .await
            .remove(correlation_id)
            .map(|entry| entry.action)
    }

    /// Drop actions older than `max_age`. Returns how many were dropped.
    pub async fn prune(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|id, entry| {
            let keep = entry.created_at > cutoff;
            if !keep {
                tracing::info!(correlation_id = %id, intent = %entry.action.intent, "pending action aged out");
            }
            keep
        });
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
