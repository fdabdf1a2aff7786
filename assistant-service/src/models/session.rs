//! Authenticated session held by the session registry.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::UserProfile;

/// A signed-in user's session.
///
/// `expires_at` doubles as the access token's expiry: it is set from the
/// session lifetime on creation and replaced by the token lifetime on refresh.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Owner of the session.
    pub user_id: String,

    /// URL-safe identifier carried in the `session_id` cookie.
    #[serde(skip_serializing)]
    pub session_id: String,

    /// Current upstream access token.
    #[serde(skip_serializing)]
    pub access_token: String,

    pub expires_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,

    pub is_active: bool,

    /// Profile captured at sign-in.
    pub user: UserProfile,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the session is usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired_at(now)
    }
}
