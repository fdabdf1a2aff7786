//! Application startup and lifecycle management.

use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

use crate::config::{AssistantConfig, ProviderKind};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::providers::mock::MockTextProvider;
use crate::services::providers::TextProvider;
use crate::services::{
    CalendarService, CredentialStore, GoogleCalendarClient, GoogleIdentityProvider,
    IdentityProvider, InMemoryCredentialStore, SessionRegistry,
};
use crate::{build_router, AppState};

/// Production wiring: Google for identity and calendar, the configured text
/// provider, and process-local session and credential storage.
pub fn build_state(config: &AssistantConfig) -> Result<AppState, AppError> {
    let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());

    let identity: Arc<dyn IdentityProvider> = Arc::new(
        GoogleIdentityProvider::new(config.google.clone())
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Google OAuth client: {}", e)))?,
    );

    let registry = Arc::new(SessionRegistry::new(credentials, identity.clone()));

    let calendar_client = GoogleCalendarClient::new()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Calendar client: {}", e)))?;
    let events = Arc::new(CalendarService::new(registry.clone(), calendar_client));

    let text_provider: Arc<dyn TextProvider> = match config.genai.provider {
        ProviderKind::Gemini => {
            let gemini = GeminiConfig::new(&config.genai.api_key, &config.genai.text_model);
            Arc::new(GeminiTextProvider::new(gemini).map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Gemini provider: {}", e))
            })?)
        }
        ProviderKind::Mock => {
            tracing::warn!("Using mock text provider");
            Arc::new(MockTextProvider::new(true))
        }
    };

    tracing::info!(
        model = %text_provider.model_name(),
        context_days = config.calendar.context_days,
        "Initialized assistant services"
    );

    Ok(AppState::new(
        config.clone(),
        registry,
        identity,
        events,
        text_provider,
    ))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: AssistantConfig) -> Result<Self, AppError> {
        let state = build_state(&config)?;

        // Port 0 picks a random port, for tests.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Assistant service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until a shutdown signal arrives.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let sweepers: Vec<_> = self
            .state
            .config
            .sweep_interval()
            .map(|every| {
                vec![
                    self.state.registry.spawn_sweeper(every),
                    self.state.chat.cache().spawn_sweeper(every),
                ]
            })
            .unwrap_or_default();

        let router = build_router(self.state)
            .map_err(|e| std::io::Error::other(format!("Failed to build router: {}", e)))?;

        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        for sweeper in sweepers {
            sweeper.abort();
        }

        result.map_err(|e| {
            tracing::error!("HTTP server error: {}", e);
            e
        })
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
