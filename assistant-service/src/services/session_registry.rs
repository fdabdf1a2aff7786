//! In-memory session registry with lazy expiry and access-token refresh.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::RngCore;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::credential_store::CredentialStore;
use super::identity::IdentityProvider;
use super::metrics;
use crate::models::{Session, UserProfile};

/// Tokens closer than this to expiry are refreshed before use.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

const SESSION_ID_BYTES: usize = 32;

/// Maps session ids to sessions, with a `user_id -> session_id` index.
///
/// A user holds at most one session; signing in again replaces the old one.
/// Map guards are never held across an `.await`.
pub struct SessionRegistry {
    sessions: DashMap<String, Session>,
    user_index: DashMap<String, String>,
    credentials: Arc<dyn CredentialStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl SessionRegistry {
    pub fn new(credentials: Arc<dyn CredentialStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            sessions: DashMap::new(),
            user_index: DashMap::new(),
            credentials,
            identity,
        }
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// 32 random bytes, base64url without padding.
    pub fn generate_session_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn create(&self, user_id: &str, access_token: &str, ttl_hours: i64) -> Session {
        self.create_with_profile(UserProfile::from_id(user_id), access_token, ttl_hours)
    }

    pub fn create_with_profile(
        &self,
        user: UserProfile,
        access_token: &str,
        ttl_hours: i64,
    ) -> Session {
        self.create_at(user, access_token, ttl_hours, Utc::now())
    }

    pub fn create_at(
        &self,
        user: UserProfile,
        access_token: &str,
        ttl_hours: i64,
        now: DateTime<Utc>,
    ) -> Session {
        let session = Session {
            user_id: user.id.clone(),
            session_id: Self::generate_session_id(),
            access_token: access_token.to_string(),
            expires_at: now + Duration::hours(ttl_hours),
            created_at: now,
            is_active: true,
            user,
        };

        let previous = self
            .user_index
            .insert(session.user_id.clone(), session.session_id.clone());
        if let Some(previous) = previous {
            self.sessions.remove(&previous);
        }
        self.sessions
            .insert(session.session_id.clone(), session.clone());

        tracing::info!(user_id = %session.user_id, "Session created");
        session
    }

    pub fn resolve(&self, session_id: &str) -> Option<Session> {
        self.resolve_at(session_id, Utc::now())
    }

    /// The session if present and unexpired; an expired one is removed.
    pub fn resolve_at(&self, session_id: &str, now: DateTime<Utc>) -> Option<Session> {
        let session = self.sessions.get(session_id).map(|s| s.value().clone())?;

        if session.is_valid_at(now) {
            return Some(session);
        }

        tracing::info!(user_id = %session.user_id, "Session expired");
        self.remove(session_id);
        None
    }

    pub async fn get_valid_access_token(&self, user_id: &str) -> Option<String> {
        self.get_valid_access_token_at(user_id, Utc::now()).await
    }

    /// The user's access token, refreshed first when within
    /// [`REFRESH_MARGIN_SECS`] of expiry. `None` when there is no live
    /// session, no stored refresh credential, or the refresh fails.
    pub async fn get_valid_access_token_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let session_id = self.user_index.get(user_id).map(|s| s.value().clone())?;
        let session = self.resolve_at(&session_id, now)?;

        if session.expires_at - now > Duration::seconds(REFRESH_MARGIN_SECS) {
            return Some(session.access_token);
        }

        let Some(refresh_token) = self.credentials.get(user_id).await else {
            tracing::warn!(user_id, "No refresh credential stored");
            metrics::record_token_refresh("missing_credential");
            return None;
        };

        let tokens = match self.identity.refresh_access_token(&refresh_token).await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Access token refresh failed");
                metrics::record_token_refresh("failed");
                return None;
            }
        };

        if let Some(rotated) = tokens.refresh_token.as_deref() {
            if rotated != refresh_token && !self.credentials.store(user_id, rotated).await {
                tracing::warn!(user_id, "Failed to store rotated refresh credential");
            }
        }

        let expires_at = now + Duration::seconds(tokens.expires_in);
        match self.sessions.get_mut(&session_id) {
            Some(mut entry) => {
                entry.access_token = tokens.access_token.clone();
                entry.expires_at = expires_at;
            }
            None => {
                tracing::debug!(user_id, "Session removed during refresh");
            }
        }

        tracing::info!(user_id, "Access token refreshed");
        metrics::record_token_refresh("success");
        Some(tokens.access_token)
    }

    /// Remove the session and delete the user's refresh credential.
    pub async fn destroy(&self, session_id: &str) -> bool {
        let Some(session) = self.remove(session_id) else {
            return false;
        };

        if !self.credentials.delete(&session.user_id).await {
            tracing::debug!(user_id = %session.user_id, "No refresh credential to delete");
        }
        tracing::info!(user_id = %session.user_id, "Session destroyed");
        true
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    /// Drop every expired session, returning how many were removed.
    pub fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| !entry.value().is_valid_at(now))
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|session_id| self.remove(session_id).is_some())
            .count()
    }

    /// Periodically purge expired sessions until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: std::time::Duration) -> JoinHandle<()> {
        let registry = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let purged = registry.purge_expired();
                if purged > 0 {
                    tracing::info!(purged, "Purged expired sessions");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn remove(&self, session_id: &str) -> Option<Session> {
        let (_, session) = self.sessions.remove(session_id)?;
        self.user_index
            .remove_if(&session.user_id, |_, indexed| indexed == session_id);
        Some(session)
    }
}
