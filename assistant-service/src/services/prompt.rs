//! Prompt composition for chat turns and calendar summaries.

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::Serialize;

use crate::models::{CalendarEvent, ChatMessage, ChatRole, SummaryType};

pub const NO_EVENTS: &str = "No calendar events available for the requested time period.";
pub const NO_HISTORY: &str = "No previous conversation.";

/// Number of prior turns included in a chat prompt.
pub const HISTORY_TURNS: usize = 5;

const SYSTEM_PROMPT: &str = "\
You are a helpful calendar assistant integrated with Google Calendar. You have access to the user's calendar events and can help them with:

1. **Schedule Management**:
   - View upcoming meetings and appointments
   - Check availability for specific dates/times
   - Identify scheduling conflicts
   - Suggest optimal meeting times

2. **Calendar Navigation**:
   - Navigate through daily, weekly, or monthly schedules
   - Find specific events by keywords
   - Show free/busy times

3. **Meeting Assistance**:
   - Provide meeting details and context
   - Help prepare for upcoming meetings
   - Suggest follow-up actions

**IMPORTANT GUIDELINES**:
- Always be polite, professional, and concise
- Use the calendar data provided to give accurate, context-aware responses
- If you don't have access to recent calendar data, acknowledge this limitation
- Never make up or assume information about events that isn't provided
- Focus on being helpful with scheduling and calendar management
- If the user asks about events outside the provided data range, be honest about the limitation

**RESPONSE STYLE**:
- Use bullet points for lists of events or times
- Keep responses focused and relevant to calendar management
- Be proactive in suggesting calendar-related assistance
- If appropriate, ask clarifying questions to better help the user";

const SUMMARY_REQUEST: &str = "\
Please provide a concise summary of the calendar above. Include:
- Total number of events
- Key highlights or important meetings
- Any potential scheduling conflicts
- Notable patterns (e.g., many meetings on certain days)
- Suggestions for better time management if applicable

Keep the summary brief but informative.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentAction {
    ScheduleManagement,
    AvailabilityCheck,
    ConflictDetection,
    Summary,
    Search,
    GeneralInquiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimePeriod {
    Today,
    Tomorrow,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Intent {
    pub action: IntentAction,
    pub time_period: Option<TimePeriod>,
}

const TIME_PERIOD_KEYWORDS: &[(TimePeriod, &[&str])] = &[
    (TimePeriod::Today, &["today", "now", "current"]),
    (TimePeriod::Tomorrow, &["tomorrow"]),
    (TimePeriod::Week, &["week"]),
    (TimePeriod::Month, &["month"]),
];

const ACTION_KEYWORDS: &[(IntentAction, &[&str])] = &[
    (
        IntentAction::ScheduleManagement,
        &["schedule", "meeting", "appointment"],
    ),
    (IntentAction::AvailabilityCheck, &["free", "available", "busy"]),
    (
        IntentAction::ConflictDetection,
        &["conflict", "overlap", "double book"],
    ),
    (IntentAction::Summary, &["summary", "overview", "what's on"]),
    (IntentAction::Search, &["find", "search", "look for"]),
];

fn first_match<T: Copy>(message: &str, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .find(|(_, words)| words.iter().any(|w| message.contains(w)))
        .map(|(value, _)| *value)
}

/// Keyword classification of a chat message. The first matching category in
/// each table wins.
pub fn extract_intent(user_message: &str) -> Intent {
    let lowered = user_message.to_lowercase();
    Intent {
        time_period: first_match(&lowered, TIME_PERIOD_KEYWORDS),
        action: first_match(&lowered, ACTION_KEYWORDS).unwrap_or(IntentAction::GeneralInquiry),
    }
}

/// Builds model prompts from calendar events and conversation turns.
///
/// Output depends only on the arguments, so the same inputs always give the
/// same prompt.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    system_prompt: String,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::with_system_prompt(SYSTEM_PROMPT)
    }

    pub fn with_system_prompt(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
        }
    }

    pub fn build(
        &self,
        user_message: &str,
        events: &[CalendarEvent],
        history: &[ChatMessage],
        now: DateTime<Utc>,
    ) -> String {
        let prompt = format!(
            "{system}\n\n\
             === CURRENT TIME ===\n{time}\n\n\
             === CALENDAR CONTEXT ===\n{calendar}\n\n\
             === CONVERSATION HISTORY ===\n{history}\n\n\
             === USER MESSAGE ===\n{message}\n\n\
             === ASSISTANT RESPONSE ===\n",
            system = self.system_prompt,
            time = now.format("%A, %B %d, %Y at %I:%M %p"),
            calendar = format_events(events, now),
            history = format_history(history),
            message = user_message,
        );

        tracing::debug!(
            event_count = events.len(),
            history_len = history.len().min(HISTORY_TURNS),
            prompt_chars = prompt.len(),
            "Built chat prompt"
        );
        prompt
    }

    /// Summary prompt for the period of `summary_type` containing `target`.
    /// Returns the prompt and the number of events it covers.
    pub fn build_summary(
        &self,
        events: &[CalendarEvent],
        summary_type: SummaryType,
        target: DateTime<Utc>,
    ) -> (String, usize) {
        let target_date = target.date_naive();

        let (selected, period): (Vec<CalendarEvent>, String) = match summary_type {
            SummaryType::Daily => (
                events
                    .iter()
                    .filter(|e| e.start_time.date_naive() == target_date)
                    .cloned()
                    .collect(),
                target.format("%A, %B %d, %Y").to_string(),
            ),
            SummaryType::Weekly => {
                let week_start = target_date
                    - Duration::days(i64::from(target_date.weekday().num_days_from_monday()));
                let week_end = week_start + Duration::days(6);
                (
                    events
                        .iter()
                        .filter(|e| {
                            let day = e.start_time.date_naive();
                            day >= week_start && day <= week_end
                        })
                        .cloned()
                        .collect(),
                    format!("Week of {}", week_start.format("%B %d")),
                )
            }
            SummaryType::Monthly => (
                events
                    .iter()
                    .filter(|e| {
                        e.start_time.year() == target.year() && e.start_time.month() == target.month()
                    })
                    .cloned()
                    .collect(),
                target.format("%B %Y").to_string(),
            ),
            SummaryType::Other => (events.to_vec(), "Selected Period".to_string()),
        };

        let prompt = format!(
            "{system}\n\n\
             Please provide a {kind} calendar summary for {period}:\n\n\
             === CALENDAR EVENTS ===\n{calendar}\n\n\
             === SUMMARY REQUEST ===\n{request}\n\n\
             === ASSISTANT RESPONSE ===\n",
            system = self.system_prompt,
            kind = summary_type.as_str(),
            period = period,
            calendar = format_events(&selected, target),
            request = SUMMARY_REQUEST,
        );
        (prompt, selected.len())
    }
}

fn day_label(event: &CalendarEvent, now: DateTime<Utc>) -> String {
    let today = now.date_naive();
    let day = event.start_time.date_naive();
    if day == today {
        "Today".to_string()
    } else if Some(day) == today.succ_opt() {
        "Tomorrow".to_string()
    } else {
        event.start_time.format("%A, %B %d").to_string()
    }
}

fn format_event(event: &CalendarEvent, now: DateTime<Utc>) -> String {
    let mut block = format!(
        "{} at {} - {}\n**{}**",
        day_label(event, now),
        event.start_time.format("%I:%M %p"),
        event.end_time.format("%I:%M %p"),
        event.title,
    );

    if let Some(description) = event.description.as_deref().filter(|d| !d.is_empty()) {
        block.push_str("\n   Description: ");
        block.push_str(description);
    }
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        block.push_str("\n   Location: ");
        block.push_str(location);
    }
    if let Some(attendees) = event.attendees.as_ref().filter(|a| !a.is_empty()) {
        block.push_str("\n   Attendees: ");
        block.push_str(&attendees.join(", "));
    }
    block
}

/// Calendar section of a prompt, events in ascending start order.
pub fn format_events(events: &[CalendarEvent], now: DateTime<Utc>) -> String {
    if events.is_empty() {
        return NO_EVENTS.to_string();
    }

    let mut sorted: Vec<&CalendarEvent> = events.iter().collect();
    sorted.sort_by_key(|e| e.start_time);

    sorted
        .into_iter()
        .map(|e| format_event(e, now))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// History section of a prompt: the last [`HISTORY_TURNS`] turns, oldest first.
pub fn format_history(history: &[ChatMessage]) -> String {
    if history.is_empty() {
        return NO_HISTORY.to_string();
    }

    let skip = history.len().saturating_sub(HISTORY_TURNS);
    history[skip..]
        .iter()
        .map(|msg| {
            let role = match msg.role {
                ChatRole::User => "User",
                ChatRole::Assistant => "Assistant",
            };
            format!("{} - {}: {}", msg.timestamp.format("%I:%M %p"), role, msg.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn event(id: &str, title: &str, start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: title.to_string(),
            start_time: start,
            end_time: start + Duration::hours(1),
            description: None,
            location: None,
            attendees: None,
            is_all_day: false,
        }
    }

    fn message(i: usize, role: ChatRole) -> ChatMessage {
        ChatMessage {
            id: format!("m{}", i),
            content: format!("turn {}", i),
            role,
            timestamp: at(2024, 5, 1, 8, i as u32),
        }
    }

    #[test]
    fn test_empty_events_render_fixed_sentence() {
        let now = at(2024, 5, 1, 9, 0);
        let prompt = PromptAssembler::new().build("hi", &[], &[], now);
        assert!(prompt.contains(NO_EVENTS));
        assert!(prompt.contains(NO_HISTORY));
    }

    #[test]
    fn test_sections_appear_in_order() {
        let now = at(2024, 5, 1, 9, 0);
        let prompt = PromptAssembler::new().build("Am I free?", &[], &[], now);

        let positions: Vec<usize> = [
            "You are a helpful calendar assistant",
            "=== CURRENT TIME ===\nWednesday, May 01, 2024 at 09:00 AM",
            "=== CALENDAR CONTEXT ===",
            "=== CONVERSATION HISTORY ===",
            "=== USER MESSAGE ===\nAm I free?",
            "=== ASSISTANT RESPONSE ===\n",
        ]
        .iter()
        .map(|s| prompt.find(s).unwrap())
        .collect();

        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.ends_with("=== ASSISTANT RESPONSE ===\n"));
    }

    #[test]
    fn test_events_sorted_and_labelled() {
        let now = at(2024, 5, 1, 7, 0);
        let events = vec![
            event("3", "Offsite", at(2024, 5, 6, 9, 0)),
            event("2", "Retro", at(2024, 5, 2, 15, 30)),
            event("1", "Standup", at(2024, 5, 1, 9, 0)),
        ];

        let text = format_events(&events, now);

        let standup = text.find("**Standup**").unwrap();
        let retro = text.find("**Retro**").unwrap();
        let offsite = text.find("**Offsite**").unwrap();
        assert!(standup < retro && retro < offsite);

        assert!(text.contains("Today at 09:00 AM - 10:00 AM\n**Standup**"));
        assert!(text.contains("Tomorrow at 03:30 PM - 04:30 PM\n**Retro**"));
        assert!(text.contains("Monday, May 06 at 09:00 AM - 10:00 AM\n**Offsite**"));
    }

    #[test]
    fn test_optional_event_lines() {
        let now = at(2024, 5, 1, 7, 0);
        let mut e = event("1", "Review", at(2024, 5, 1, 11, 0));
        e.description = Some("Quarterly numbers".to_string());
        e.location = Some("Room 4".to_string());
        e.attendees = Some(vec!["a@example.com".to_string(), "b@example.com".to_string()]);

        let text = format_events(&[e], now);
        assert!(text.ends_with(
            "**Review**\n   Description: Quarterly numbers\n   Location: Room 4\n   Attendees: a@example.com, b@example.com"
        ));
    }

    #[test]
    fn test_user_message_included_verbatim() {
        let message = "Can you move my 3pm? It's \"urgent\".";
        let prompt = PromptAssembler::new().build(message, &[], &[], at(2024, 5, 1, 9, 0));
        assert!(prompt.contains(message));
    }

    #[test]
    fn test_history_keeps_last_five_oldest_first() {
        let history: Vec<ChatMessage> = (0..8)
            .map(|i| {
                let role = if i % 2 == 0 { ChatRole::User } else { ChatRole::Assistant };
                message(i, role)
            })
            .collect();

        let text = format_history(&history);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "08:03 AM - Assistant: turn 3");
        assert_eq!(lines[4], "08:07 AM - Assistant: turn 7");
        assert!(!text.contains("turn 2"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let now = at(2024, 5, 1, 9, 0);
        let events = vec![event("1", "Standup", at(2024, 5, 1, 9, 30))];
        let history = vec![message(1, ChatRole::User)];
        let assembler = PromptAssembler::new();

        assert_eq!(
            assembler.build("hello", &events, &history, now),
            assembler.build("hello", &events, &history, now)
        );
    }

    #[test]
    fn test_summary_filters_by_period() {
        // Wednesday; the week runs Monday Apr 29 to Sunday May 5.
        let target = at(2024, 5, 1, 12, 0);
        let events = vec![
            event("a", "Same day", at(2024, 5, 1, 9, 0)),
            event("b", "Same week", at(2024, 4, 29, 9, 0)),
            event("c", "Same month", at(2024, 5, 20, 9, 0)),
            event("d", "Next month", at(2024, 6, 3, 9, 0)),
        ];
        let assembler = PromptAssembler::new();

        let (daily, n) = assembler.build_summary(&events, SummaryType::Daily, target);
        assert_eq!(n, 1);
        assert!(daily.contains("Please provide a daily calendar summary for Wednesday, May 01, 2024:"));

        let (weekly, n) = assembler.build_summary(&events, SummaryType::Weekly, target);
        assert_eq!(n, 2);
        assert!(weekly.contains("for Week of April 29:"));
        assert!(!weekly.contains("Same month"));

        let (monthly, n) = assembler.build_summary(&events, SummaryType::Monthly, target);
        assert_eq!(n, 2);
        assert!(monthly.contains("for May 2024:"));
        assert!(!monthly.contains("Next month"));

        let (other, n) = assembler.build_summary(&events, SummaryType::Other, target);
        assert_eq!(n, 4);
        assert!(other.contains("Selected Period"));
    }

    #[test]
    fn test_summary_with_no_events_in_period() {
        let (prompt, n) = PromptAssembler::new().build_summary(
            &[],
            SummaryType::Daily,
            at(2024, 5, 1, 12, 0),
        );
        assert_eq!(n, 0);
        assert!(prompt.contains(NO_EVENTS));
        assert!(prompt.contains("Keep the summary brief but informative."));
    }

    #[test]
    fn test_intent_time_period() {
        assert_eq!(
            extract_intent("What's on my calendar today?").time_period,
            Some(TimePeriod::Today)
        );
        assert_eq!(
            extract_intent("Anything TOMORROW?").time_period,
            Some(TimePeriod::Tomorrow)
        );
        assert_eq!(
            extract_intent("how does next week look").time_period,
            Some(TimePeriod::Week)
        );
        assert_eq!(extract_intent("this month please").time_period, Some(TimePeriod::Month));
        assert_eq!(extract_intent("hello").time_period, None);
    }

    #[test]
    fn test_intent_action_first_match_wins() {
        assert_eq!(
            extract_intent("What's on my calendar today?").action,
            IntentAction::Summary
        );
        // "meeting" outranks "free".
        assert_eq!(
            extract_intent("Am I free for a meeting?").action,
            IntentAction::ScheduleManagement
        );
        assert_eq!(
            extract_intent("Do these overlap?").action,
            IntentAction::ConflictDetection
        );
        assert_eq!(extract_intent("Look for the dentist").action, IntentAction::Search);
        assert_eq!(extract_intent("hello there").action, IntentAction::GeneralInquiry);
    }

    #[test]
    fn test_intent_serializes_snake_case() {
        let json = serde_json::to_value(extract_intent("am I busy tomorrow")).unwrap();
        assert_eq!(json["action"], "availability_check");
        assert_eq!(json["time_period"], "tomorrow");
    }
}
