use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A calendar event normalised from the provider's representation.
///
/// All-day events are anchored at midnight UTC of their start and end dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Attendee email addresses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
    #[serde(default)]
    pub is_all_day: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CalendarEventsQuery {
    #[serde(default = "default_days_ahead")]
    #[validate(range(min = 1, max = 30, message = "days_ahead must be between 1 and 30"))]
    pub days_ahead: u32,
}

fn default_days_ahead() -> u32 {
    7
}

#[derive(Debug, Serialize)]
pub struct CalendarEventsResponse {
    pub events: Vec<CalendarEvent>,
    pub total_count: usize,
    pub time_range: String,
}

impl CalendarEventsResponse {
    pub fn new(events: Vec<CalendarEvent>, days_ahead: u32) -> Self {
        Self {
            total_count: events.len(),
            events,
            time_range: format!("Next {} days", days_ahead),
        }
    }
}

/// Period a calendar summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    Daily,
    Weekly,
    Monthly,
    /// Anything else summarises every cached event.
    Other,
}

impl SummaryType {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "daily" => SummaryType::Daily,
            "weekly" => SummaryType::Weekly,
            "monthly" => SummaryType::Monthly,
            _ => SummaryType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Daily => "daily",
            SummaryType::Weekly => "weekly",
            SummaryType::Monthly => "monthly",
            SummaryType::Other => "other",
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct SummaryQuery {
    #[serde(default = "default_summary_type")]
    #[validate(length(min = 1, max = 32))]
    pub summary_type: String,
}

fn default_summary_type() -> String {
    "daily".to_string()
}

#[derive(Debug, Serialize)]
pub struct SummaryResponse {
    pub summary: String,
    pub summary_type: SummaryType,
    pub event_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_days_ahead_bounds() {
        assert!(CalendarEventsQuery { days_ahead: 1 }.validate().is_ok());
        assert!(CalendarEventsQuery { days_ahead: 30 }.validate().is_ok());
        assert!(CalendarEventsQuery { days_ahead: 0 }.validate().is_err());
        assert!(CalendarEventsQuery { days_ahead: 31 }.validate().is_err());
    }

    #[test]
    fn test_summary_type_parse() {
        assert_eq!(SummaryType::parse("Weekly"), SummaryType::Weekly);
        assert_eq!(SummaryType::parse("quarterly"), SummaryType::Other);
    }

    #[test]
    fn test_events_response_time_range() {
        let response = CalendarEventsResponse::new(Vec::new(), 14);
        assert_eq!(response.time_range, "Next 14 days");
        assert_eq!(response.total_count, 0);
    }
}
