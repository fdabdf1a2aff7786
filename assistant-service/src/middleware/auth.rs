use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::{models::Session, AppState};

pub const SESSION_COOKIE: &str = "session_id";

/// `session_id` cookie for a new session: HTTP-only, SameSite=Lax.
pub fn session_cookie(session_id: String, max_age_secs: i64, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Live session resolved from the `session_id` cookie.
pub struct AuthUser(pub Session);

impl AuthUser {
    pub fn user_id(&self) -> &str {
        &self.0.user_id
    }
}

/// Session for the request's cookie, if any and still valid.
pub fn current_session(jar: &CookieJar, state: &AppState) -> Option<Session> {
    let session_id = jar.get(SESSION_COOKIE)?.value();
    state.registry.resolve(session_id)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        current_session(&jar, state)
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Not authenticated")))
    }
}
