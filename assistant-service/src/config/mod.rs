use serde::Deserialize;
use service_core::config::{self as core_config, get_env, get_env_opt, get_env_parsed};
use service_core::error::AppError;
use std::time::Duration;

pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:8000/api/v1/auth/google/callback";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-2.0-flash-lite";
pub const DEFAULT_FRONTEND_URL: &str = "http://localhost:5173";

pub const DEFAULT_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/calendar.readonly",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
    "openid",
];

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub google: GoogleOAuthConfig,
    pub genai: GenaiConfig,
    pub session: SessionConfig,
    pub calendar: CalendarConfig,
    pub frontend_url: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub is_production: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

/// Which text provider backs the response generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Mock,
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(ProviderKind::Gemini),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GenaiConfig {
    pub provider: ProviderKind,
    pub api_key: String,
    pub text_model: String,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub attempt_timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub expire_hours: i64,
    pub cookie_secure: bool,
    /// Zero disables the background sweep; expiry is then purely lazy.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    pub cache_ttl_secs: u64,
    pub context_days: u32,
}

impl AssistantConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = core_config::is_production();

        let provider: ProviderKind = get_env_parsed("GENAI_PROVIDER", ProviderKind::Gemini)?;
        let api_key = match provider {
            ProviderKind::Gemini => get_env("GOOGLE_GEMINI_API_KEY", None, is_prod)?,
            ProviderKind::Mock => get_env_opt("GOOGLE_GEMINI_API_KEY").unwrap_or_default(),
        };

        let scopes = match get_env_opt("GOOGLE_OAUTH_SCOPES") {
            Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
            None => DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        };

        Ok(AssistantConfig {
            common: common_config,
            google: GoogleOAuthConfig {
                client_id: get_env("GOOGLE_OAUTH_CLIENT_ID", None, is_prod)?,
                client_secret: get_env("GOOGLE_OAUTH_CLIENT_SECRET", None, is_prod)?,
                redirect_uri: get_env(
                    "GOOGLE_OAUTH_REDIRECT_URI",
                    Some(DEFAULT_REDIRECT_URI),
                    is_prod,
                )?,
                scopes,
            },
            genai: GenaiConfig {
                provider,
                api_key,
                text_model: get_env("GENAI_TEXT_MODEL", Some(DEFAULT_TEXT_MODEL), is_prod)?,
                max_attempts: get_env_parsed("GENAI_MAX_ATTEMPTS", 3)?,
                retry_base_delay_ms: get_env_parsed("GENAI_RETRY_BASE_DELAY_MS", 1000)?,
                attempt_timeout_secs: get_env_parsed("GENAI_ATTEMPT_TIMEOUT_SECS", 30)?,
                temperature: get_env_parsed("GENAI_TEMPERATURE", 0.7)?,
            },
            session: SessionConfig {
                expire_hours: get_env_parsed("SESSION_EXPIRE_HOURS", 24)?,
                cookie_secure: get_env_parsed("SESSION_COOKIE_SECURE", is_prod)?,
                sweep_interval_secs: get_env_parsed("SESSION_SWEEP_INTERVAL_SECS", 600)?,
            },
            calendar: CalendarConfig {
                cache_ttl_secs: get_env_parsed("CALENDAR_CACHE_TTL_SECS", 300)?,
                context_days: get_env_parsed("CALENDAR_CONTEXT_DAYS", 7)?,
            },
            frontend_url: get_env("FRONTEND_URL", Some(DEFAULT_FRONTEND_URL), is_prod)?,
            log_level: get_env_opt("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            otlp_endpoint: get_env_opt("OTLP_ENDPOINT"),
            is_production: is_prod,
        })
    }

    pub fn session_max_age_secs(&self) -> i64 {
        self.session.expire_hours * 3600
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.calendar.cache_ttl_secs)
    }

    /// Sweep interval, `None` when the sweep is disabled.
    pub fn sweep_interval(&self) -> Option<Duration> {
        match self.session.sweep_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}
