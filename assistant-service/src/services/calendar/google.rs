//! Google Calendar v3 client.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use super::CalendarError;
use crate::models::CalendarEvent;

pub const GOOGLE_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

const MAX_RESULTS: u32 = 50;
const UNTITLED_EVENT: &str = "Untitled Event";

#[derive(Clone)]
pub struct GoogleCalendarClient {
    client: Client,
    base_url: String,
}

impl GoogleCalendarClient {
    pub fn new() -> Result<Self, CalendarError> {
        Self::with_base_url(GOOGLE_CALENDAR_API_BASE)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, CalendarError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| CalendarError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Single (expanded) events on the primary calendar between `time_min`
    /// and `time_max`, ordered by start time.
    #[tracing::instrument(skip(self, access_token))]
    pub async fn list_events(
        &self,
        access_token: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, CalendarError> {
        let url = format!("{}/calendars/primary/events", self.base_url);
        let query = [
            ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", MAX_RESULTS.to_string()),
        ];

        let response = self
            .client
            .get(&url)
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await
            .map_err(|e| CalendarError::Network(format!("Google API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CalendarError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let listing: GoogleEventsResponse = response
            .json()
            .await
            .map_err(|e| CalendarError::Parse(format!("Failed to parse Google response: {}", e)))?;

        let events: Vec<CalendarEvent> = listing
            .items
            .into_iter()
            .filter_map(transform_event)
            .collect();

        tracing::info!(event_count = events.len(), "Fetched calendar events");
        Ok(events)
    }
}

fn transform_event(event: GoogleCalendarEvent) -> Option<CalendarEvent> {
    let GoogleCalendarEvent {
        id,
        summary,
        description,
        location,
        start,
        end,
        attendees,
    } = event;

    let (Some((start_time, is_all_day)), Some((end_time, _))) =
        (parse_time(&start), parse_time(&end))
    else {
        warn!(event_id = %id, "Could not parse event times, skipping");
        return None;
    };

    let attendees = attendees
        .map(|list| {
            list.into_iter()
                .filter_map(|a| a.email.and_then(|email| validate_and_log_email(&email, &id)))
                .collect::<Vec<_>>()
        })
        .filter(|list| !list.is_empty());

    Some(CalendarEvent {
        title: summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| UNTITLED_EVENT.to_string()),
        id,
        start_time,
        end_time,
        description: description.filter(|d| !d.trim().is_empty()),
        location: location.filter(|l| !l.trim().is_empty()),
        attendees,
        is_all_day,
    })
}

/// `dateTime` as an instant, or an all-day `date` at midnight UTC.
fn parse_time(value: &EventDateTime) -> Option<(DateTime<Utc>, bool)> {
    if let Some(date_time) = value.date_time.as_deref() {
        return DateTime::parse_from_rfc3339(date_time)
            .ok()
            .map(|dt| (dt.with_timezone(&Utc), false));
    }

    let date = NaiveDate::parse_from_str(value.date.as_deref()?, "%Y-%m-%d").ok()?;
    Some((date.and_hms_opt(0, 0, 0)?.and_utc(), true))
}

/// Returns None only for empty emails. Malformed ones are logged and kept.
fn validate_and_log_email(email: &str, event_id: &str) -> Option<String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        warn!(event_id, "empty attendee email");
        return None;
    }
    if !trimmed.contains('@') {
        warn!(event_id, "attendee email missing @ symbol");
    }
    Some(trimmed.to_string())
}

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    #[serde(default)]
    items: Vec<GoogleCalendarEvent>,
}

#[derive(Debug, Deserialize)]
struct GoogleCalendarEvent {
    id: String,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(default)]
    start: EventDateTime,
    #[serde(default)]
    end: EventDateTime,
    attendees: Option<Vec<GoogleAttendee>>,
}

#[derive(Debug, Default, Deserialize)]
struct EventDateTime {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleAttendee {
    email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn parse(json: serde_json::Value) -> Option<CalendarEvent> {
        transform_event(serde_json::from_value(json).unwrap())
    }

    #[test]
    fn test_timed_event() {
        let event = parse(serde_json::json!({
            "id": "e1",
            "summary": "Standup",
            "location": "Room 1",
            "start": {"dateTime": "2024-05-01T09:00:00+02:00"},
            "end": {"dateTime": "2024-05-01T09:15:00+02:00"},
            "attendees": [{"email": "a@example.com"}, {"email": " "}, {}]
        }))
        .unwrap();

        assert_eq!(event.title, "Standup");
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 5, 1, 7, 0, 0).unwrap());
        assert!(!event.is_all_day);
        assert_eq!(event.location.as_deref(), Some("Room 1"));
        assert_eq!(event.attendees, Some(vec!["a@example.com".to_string()]));
    }

    #[test]
    fn test_all_day_event_anchored_at_midnight() {
        let event = parse(serde_json::json!({
            "id": "e2",
            "start": {"date": "2024-05-02"},
            "end": {"date": "2024-05-03"}
        }))
        .unwrap();

        assert!(event.is_all_day);
        assert_eq!(event.title, UNTITLED_EVENT);
        assert_eq!(event.start_time, Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap());
        assert_eq!(event.end_time, Utc.with_ymd_and_hms(2024, 5, 3, 0, 0, 0).unwrap());
        assert!(event.attendees.is_none());
    }

    #[test]
    fn test_unparseable_event_is_skipped() {
        assert!(parse(serde_json::json!({
            "id": "e3",
            "summary": "Broken",
            "start": {"dateTime": "yesterday-ish"},
            "end": {"dateTime": "2024-05-01T10:00:00Z"}
        }))
        .is_none());

        assert!(parse(serde_json::json!({"id": "e4", "summary": "No times"})).is_none());
    }
}
