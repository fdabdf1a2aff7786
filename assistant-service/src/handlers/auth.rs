//! Google sign-in, sign-out and session introspection.

use axum::{
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::middleware::auth::{current_session, session_cookie, AuthUser, SESSION_COOKIE};
use crate::models::UserProfile;
use crate::services::SessionRegistry;
use crate::AppState;

const OAUTH_STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub picture: String,
}

impl From<UserProfile> for MeResponse {
    fn from(user: UserProfile) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            picture: user.picture,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthStatusResponse {
    pub authenticated: bool,
    pub user: Option<UserProfile>,
}

pub async fn google_login(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let oauth_state = SessionRegistry::generate_session_id();
    let auth_url = state.identity.authorization_url(&oauth_state);

    let updated_jar = jar.add(
        Cookie::build((OAUTH_STATE_COOKIE, oauth_state))
            .path("/")
            .http_only(true)
            .secure(state.config.session.cookie_secure)
            .max_age(time::Duration::minutes(5))
            .build(),
    );

    (updated_jar, Redirect::to(&auth_url).into_response())
}

#[tracing::instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<(CookieJar, Response), AppError> {
    if let Some(error) = query.error {
        tracing::warn!(error = %error, "Google returned an OAuth error");
        return Err(AppError::BadRequest(anyhow::anyhow!("OAuth error: {}", error)));
    }

    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Missing required parameters"
        )));
    };

    let stored_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value());
    if stored_state != Some(returned_state.as_str()) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
    }

    let tokens = state.identity.exchange_code(&code).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to exchange Google code");
        AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
    })?;

    let profile = state
        .identity
        .fetch_profile(&tokens.access_token)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch Google user info");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?;

    match tokens.refresh_token.as_deref() {
        Some(refresh_token) => {
            if !state
                .registry
                .credentials()
                .store(&profile.id, refresh_token)
                .await
            {
                tracing::error!(user_id = %profile.id, "Failed to store refresh credential");
            }
        }
        None => {
            tracing::warn!(user_id = %profile.id, "Google did not return a refresh token");
        }
    }

    let session = state.registry.create_with_profile(
        profile,
        &tokens.access_token,
        state.config.session.expire_hours,
    );
    state.chat.cache().invalidate(&session.user_id);

    tracing::info!(user_id = %session.user_id, "User signed in via Google");

    let updated_jar = jar.remove(Cookie::from(OAUTH_STATE_COOKIE)).add(session_cookie(
        session.session_id,
        state.config.session_max_age_secs(),
        state.config.session.cookie_secure,
    ));

    Ok((
        updated_jar,
        Redirect::to(&state.config.frontend_url).into_response(),
    ))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    if let Some(session_id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        if let Some(session) = state.registry.resolve(&session_id) {
            state.chat.cache().invalidate(&session.user_id);
        }
        if state.registry.destroy(&session_id).await {
            tracing::info!("User signed out");
        }
    }

    let cleared = jar.remove(Cookie::build(SESSION_COOKIE).path("/").build());
    (
        cleared,
        Redirect::to(&state.config.frontend_url).into_response(),
    )
}

pub async fn me(AuthUser(session): AuthUser) -> Json<MeResponse> {
    Json(session.user.into())
}

pub async fn status(State(state): State<AppState>, jar: CookieJar) -> Json<AuthStatusResponse> {
    let user = current_session(&jar, &state).map(|s| s.user);
    Json(AuthStatusResponse {
        authenticated: user.is_some(),
        user,
    })
}
