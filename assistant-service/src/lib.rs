pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::AssistantConfig;
use crate::services::providers::TextProvider;
use crate::services::{
    CalendarContextCache, ChatService, EventSource, IdentityProvider, PromptAssembler,
    ResponseGenerator, RetryPolicy, SessionRegistry,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AssistantConfig,
    pub registry: Arc<SessionRegistry>,
    pub identity: Arc<dyn IdentityProvider>,
    /// Direct calendar access, bypassing the context cache.
    pub events: Arc<dyn EventSource>,
    pub chat: Arc<ChatService>,
    pub text_provider: Arc<dyn TextProvider>,
}

impl AppState {
    /// Wire the chat pipeline around already-built collaborators.
    pub fn new(
        config: AssistantConfig,
        registry: Arc<SessionRegistry>,
        identity: Arc<dyn IdentityProvider>,
        events: Arc<dyn EventSource>,
        text_provider: Arc<dyn TextProvider>,
    ) -> Self {
        let cache = Arc::new(CalendarContextCache::new(
            events.clone(),
            config.cache_ttl(),
            config.calendar.context_days,
        ));
        let policy = RetryPolicy {
            max_attempts: config.genai.max_attempts,
            base_delay: std::time::Duration::from_millis(config.genai.retry_base_delay_ms),
            attempt_timeout: std::time::Duration::from_secs(config.genai.attempt_timeout_secs),
        };
        let chat = Arc::new(ChatService::new(
            cache,
            PromptAssembler::new(),
            ResponseGenerator::new(text_provider.clone(), policy),
            config.genai.temperature,
        ));

        Self {
            config,
            registry,
            identity,
            events,
            chat,
            text_provider,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let frontend_origin = state
        .config
        .frontend_url
        .trim_end_matches('/')
        .parse::<HeaderValue>()
        .map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!(
                "Invalid FRONTEND_URL '{}': {}",
                state.config.frontend_url,
                e
            ))
        })?;

    let auth_routes = Router::new()
        .route("/google", get(handlers::auth::google_login))
        .route("/google/callback", get(handlers::auth::google_callback))
        .route(
            "/logout",
            get(handlers::auth::logout).post(handlers::auth::logout),
        )
        .route("/me", get(handlers::auth::me))
        .route("/status", get(handlers::auth::status));

    let calendar_routes = Router::new()
        .route("/events", get(handlers::calendar::list_events))
        .route("/summary", get(handlers::calendar::summary));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .nest("/api/v1/auth", auth_routes)
        .nest("/api/v1/calendar", calendar_routes)
        .route("/api/chat", post(handlers::chat::chat))
        .route("/api/chat/stream", post(handlers::chat::chat_stream))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(frontend_origin)
                .allow_credentials(true)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::ACCEPT,
                    header::HeaderName::from_static("x-request-id"),
                ]),
        );

    Ok(app)
}
