pub mod calendar;
pub mod calendar_cache;
pub mod chat;
pub mod credential_store;
pub mod generator;
pub mod identity;
pub mod metrics;
pub mod prompt;
pub mod providers;
pub mod session_registry;
pub mod streaming;

pub use calendar::{CalendarError, CalendarService, EventSource, GoogleCalendarClient};
pub use calendar_cache::CalendarContextCache;
pub use chat::{ChatError, ChatService};
pub use credential_store::{CredentialStore, InMemoryCredentialStore};
pub use generator::{ResponseGenerator, RetryPolicy};
pub use identity::{GoogleIdentityProvider, IdentityError, IdentityProvider};
pub use prompt::PromptAssembler;
pub use session_registry::SessionRegistry;
pub use streaming::StreamEvent;
