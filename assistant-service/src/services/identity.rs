//! OAuth identity provider client (Google).

use async_trait::async_trait;
use reqwest::Client;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

use crate::config::GoogleOAuthConfig;
use crate::models::{GoogleTokens, UserProfile};

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Identity provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Exchanges authorization codes, reads profiles and refreshes access tokens.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL the browser is redirected to.
    fn authorization_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens, IdentityError>;

    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, IdentityError>;

    async fn refresh_access_token(&self, refresh_token: &str)
        -> Result<GoogleTokens, IdentityError>;
}

/// Google OAuth endpoints, overridable for tests.
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }
}

impl GoogleEndpoints {
    /// Endpoints rooted at a single base URL, as served by a mock server.
    pub fn with_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            auth_url: format!("{}/o/oauth2/v2/auth", base),
            token_url: format!("{}/token", base),
            userinfo_url: format!("{}/oauth2/v2/userinfo", base),
        }
    }
}

pub struct GoogleIdentityProvider {
    config: GoogleOAuthConfig,
    endpoints: GoogleEndpoints,
    client: Client,
}

impl GoogleIdentityProvider {
    pub fn new(config: GoogleOAuthConfig) -> Result<Self, IdentityError> {
        Self::with_endpoints(config, GoogleEndpoints::default())
    }

    pub fn with_endpoints(
        config: GoogleOAuthConfig,
        endpoints: GoogleEndpoints,
    ) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| IdentityError::NetworkError(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            config,
            endpoints,
            client,
        })
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> Result<GoogleTokens, IdentityError> {
        let response = self
            .client
            .post(&self.endpoints.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }

        response
            .json::<GoogleTokens>()
            .await
            .map_err(|e| IdentityError::InvalidResponse(format!("token response: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        let scope = self.config.scopes.join(" ");
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("response_type", "code"),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ];

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        format!("{}?{}", self.endpoints.auth_url, query)
    }

    #[tracing::instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens, IdentityError> {
        self.post_token_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ])
        .await
    }

    #[tracing::instrument(skip_all)]
    async fn fetch_profile(&self, access_token: &str) -> Result<UserProfile, IdentityError> {
        let response = self
            .client
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| IdentityError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IdentityError::Rejected { status, body });
        }

        response
            .json::<UserProfile>()
            .await
            .map_err(|e| IdentityError::InvalidResponse(format!("userinfo response: {}", e)))
    }

    #[tracing::instrument(skip_all)]
    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<GoogleTokens, IdentityError> {
        self.post_token_form(&[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

/// Scripted identity provider for tests and local runs without Google.
pub struct MockIdentityProvider {
    profile: UserProfile,
    refresh_result: Mutex<Option<GoogleTokens>>,
    refresh_calls: AtomicUsize,
}

impl MockIdentityProvider {
    /// Every code exchanges to `access-<code>` with refresh token `refresh-<code>`.
    pub fn new(profile: UserProfile) -> Self {
        Self {
            profile,
            refresh_result: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    /// Make refreshes succeed with `access_token` valid for `expires_in` seconds.
    pub fn with_refresh(self, access_token: &str, expires_in: i64) -> Self {
        if let Ok(mut slot) = self.refresh_result.lock() {
            *slot = Some(GoogleTokens {
                access_token: access_token.to_string(),
                refresh_token: None,
                expires_in,
                token_type: "Bearer".to_string(),
            });
        }
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "https://accounts.example.test/auth?state={}",
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<GoogleTokens, IdentityError> {
        if code.is_empty() {
            return Err(IdentityError::Rejected {
                status: 400,
                body: "invalid_grant".to_string(),
            });
        }
        Ok(GoogleTokens {
            access_token: format!("access-{}", code),
            refresh_token: Some(format!("refresh-{}", code)),
            expires_in: 3600,
            token_type: "Bearer".to_string(),
        })
    }

    async fn fetch_profile(&self, _access_token: &str) -> Result<UserProfile, IdentityError> {
        Ok(self.profile.clone())
    }

    async fn refresh_access_token(
        &self,
        _refresh_token: &str,
    ) -> Result<GoogleTokens, IdentityError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let result = self
            .refresh_result
            .lock()
            .map_err(|_| IdentityError::InvalidResponse("poisoned".to_string()))?
            .clone();
        result.ok_or(IdentityError::Rejected {
            status: 400,
            body: "invalid_grant".to_string(),
        })
    }
}
