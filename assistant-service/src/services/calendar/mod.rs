//! Calendar event retrieval on behalf of a signed-in user.

pub mod google;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

pub use google::GoogleCalendarClient;

use super::session_registry::SessionRegistry;
use crate::models::CalendarEvent;

#[derive(Error, Debug, Clone)]
pub enum CalendarError {
    #[error("No valid access token for user")]
    NotAuthenticated,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Calendar API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

impl CalendarError {
    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CalendarError::NotAuthenticated => "not_authenticated",
            CalendarError::Network(_) => "network",
            CalendarError::Api { .. } => "api",
            CalendarError::Parse(_) => "parse",
        }
    }
}

/// Fetches a user's upcoming events.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch_events(
        &self,
        user_id: &str,
        days_ahead: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError>;
}

/// Google-backed [`EventSource`] using the registry's access tokens.
pub struct CalendarService {
    registry: Arc<SessionRegistry>,
    client: GoogleCalendarClient,
}

impl CalendarService {
    pub fn new(registry: Arc<SessionRegistry>, client: GoogleCalendarClient) -> Self {
        Self { registry, client }
    }
}

#[async_trait]
impl EventSource for CalendarService {
    async fn fetch_events(
        &self,
        user_id: &str,
        days_ahead: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let access_token = self
            .registry
            .get_valid_access_token(user_id)
            .await
            .ok_or(CalendarError::NotAuthenticated)?;

        let time_min = Utc::now();
        let time_max = time_min + Duration::days(i64::from(days_ahead));
        self.client
            .list_events(&access_token, time_min, time_max)
            .await
    }
}

/// Fixed event list, for local runs and tests. Counts fetches.
pub struct StaticEventSource {
    events: Vec<CalendarEvent>,
    failure: Option<CalendarError>,
    fetches: AtomicUsize,
}

impl StaticEventSource {
    pub fn new(events: Vec<CalendarEvent>) -> Self {
        Self {
            events,
            failure: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: CalendarError) -> Self {
        Self {
            events: Vec::new(),
            failure: Some(error),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for StaticEventSource {
    async fn fetch_events(
        &self,
        _user_id: &str,
        _days_ahead: u32,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(self.events.clone()),
        }
    }
}
