//! Shared fixtures for the HTTP tests: an in-process router with scripted
//! collaborators in place of Google and Gemini.

#![allow(dead_code)]

use assistant_service::config::{
    AssistantConfig, CalendarConfig, GenaiConfig, GoogleOAuthConfig, ProviderKind, SessionConfig,
};
use assistant_service::models::{CalendarEvent, UserProfile};
use assistant_service::services::calendar::StaticEventSource;
use assistant_service::services::identity::MockIdentityProvider;
use assistant_service::services::providers::mock::ScriptedTextProvider;
use assistant_service::services::{InMemoryCredentialStore, SessionRegistry};
use assistant_service::{build_router, AppState};
use axum::body::Body;
use axum::http::{header, Request, Response};
use axum::Router;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

pub const FRONTEND_URL: &str = "http://localhost:5173";
pub const USER_ID: &str = "google-user-1";

pub fn test_config() -> AssistantConfig {
    AssistantConfig {
        common: service_core::config::Config { port: 0 },
        google: GoogleOAuthConfig {
            client_id: "test-client".to_string(),
            client_secret: "test-secret".to_string(),
            redirect_uri: "http://localhost:8000/api/v1/auth/google/callback".to_string(),
            scopes: vec!["openid".to_string()],
        },
        genai: GenaiConfig {
            provider: ProviderKind::Mock,
            api_key: String::new(),
            text_model: "scripted".to_string(),
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            attempt_timeout_secs: 30,
            temperature: 0.7,
        },
        session: SessionConfig {
            expire_hours: 24,
            cookie_secure: false,
            sweep_interval_secs: 0,
        },
        calendar: CalendarConfig {
            cache_ttl_secs: 300,
            context_days: 7,
        },
        frontend_url: FRONTEND_URL.to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        is_production: false,
    }
}

pub fn profile() -> UserProfile {
    UserProfile {
        id: USER_ID.to_string(),
        email: "ada@example.com".to_string(),
        name: "Ada".to_string(),
        picture: "https://example.com/ada.png".to_string(),
        verified_email: true,
    }
}

pub fn event(id: &str, start: DateTime<Utc>) -> CalendarEvent {
    CalendarEvent {
        id: id.to_string(),
        title: format!("Meeting {}", id),
        start_time: start,
        end_time: start + Duration::minutes(30),
        description: None,
        location: None,
        attendees: None,
        is_all_day: false,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub provider: Arc<ScriptedTextProvider>,
    pub source: Arc<StaticEventSource>,
    pub credentials: Arc<InMemoryCredentialStore>,
    pub identity: Arc<MockIdentityProvider>,
}

impl TestApp {
    pub fn new(provider: ScriptedTextProvider, source: StaticEventSource) -> Self {
        let provider = Arc::new(provider);
        let source = Arc::new(source);
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let identity = Arc::new(MockIdentityProvider::new(profile()));
        let registry = Arc::new(SessionRegistry::new(credentials.clone(), identity.clone()));

        let state = AppState::new(
            test_config(),
            registry,
            identity.clone(),
            source.clone(),
            provider.clone(),
        );
        let router = build_router(state.clone()).expect("router");

        Self {
            router,
            state,
            provider,
            source,
            credentials,
            identity,
        }
    }

    pub fn replying(chunks: &[&str]) -> Self {
        Self::new(
            ScriptedTextProvider::replying(chunks),
            StaticEventSource::new(Vec::new()),
        )
    }

    /// Sign the test user in and return the `Cookie` header value.
    pub fn login(&self) -> String {
        let session = self.state.registry.create_with_profile(profile(), "access-1", 24);
        format!("session_id={}", session.session_id)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap())
            .await
    }
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}

/// All `Set-Cookie` header values of `response`.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}
