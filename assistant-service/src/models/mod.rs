//! Domain models for the assistant service.

pub mod calendar;
pub mod chat;
pub mod session;
pub mod user;

pub use calendar::{
    CalendarEvent, CalendarEventsQuery, CalendarEventsResponse, SummaryQuery, SummaryResponse,
    SummaryType,
};
pub use chat::{ChatMessage, ChatRequest, ChatResponse, ChatRole, MAX_MESSAGE_CHARS};
pub use session::Session;
pub use user::{GoogleTokens, UserProfile};
