use serde::{Deserialize, Serialize};

/// Google account profile, as returned by the userinfo endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default = "default_verified")]
    pub verified_email: bool,
}

fn default_verified() -> bool {
    true
}

impl UserProfile {
    /// Profile with only an id, for sessions created without a userinfo lookup.
    pub fn from_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: String::new(),
            name: String::new(),
            picture: String::new(),
            verified_email: true,
        }
    }
}

/// Token endpoint response for both code exchange and refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleTokens {
    pub access_token: String,
    /// Only present on the first consent; refresh responses usually omit it.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_expires_in() -> i64 {
    3600
}

fn default_token_type() -> String {
    "Bearer".to_string()
}
