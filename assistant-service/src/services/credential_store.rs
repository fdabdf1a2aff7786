//! Storage for long-lived refresh credentials, keyed by user id.

use async_trait::async_trait;
use dashmap::DashMap;

/// Opaque secret storage. Failures are reported as `false`/`None`, never raised.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn store(&self, user_id: &str, secret: &str) -> bool;

    async fn get(&self, user_id: &str) -> Option<String>;

    /// Returns whether a credential was removed.
    async fn delete(&self, user_id: &str) -> bool;
}

/// Process-local credential store.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    secrets: DashMap<String, String>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn store(&self, user_id: &str, secret: &str) -> bool {
        self.secrets.insert(user_id.to_string(), secret.to_string());
        tracing::debug!(user_id, "Stored refresh credential");
        true
    }

    async fn get(&self, user_id: &str) -> Option<String> {
        self.secrets.get(user_id).map(|s| s.value().clone())
    }

    async fn delete(&self, user_id: &str) -> bool {
        let removed = self.secrets.remove(user_id).is_some();
        if removed {
            tracing::debug!(user_id, "Deleted refresh credential");
        }
        removed
    }
}
