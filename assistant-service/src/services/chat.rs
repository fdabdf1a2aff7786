//! Chat pipeline: calendar context, prompt, generation and framing.

use chrono::{DateTime, Utc};
use futures::Stream;
use service_core::error::AppError;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

use super::calendar_cache::CalendarContextCache;
use super::generator::ResponseGenerator;
use super::metrics;
use super::prompt::{extract_intent, PromptAssembler};
use super::providers::GenerationParams;
use super::streaming::{self, EventStream, PROCESSING_APOLOGY};
use crate::models::{ChatRequest, ChatResponse, SummaryResponse, SummaryType};
use crate::models::chat::is_valid_message;

pub const SUMMARY_TEMPERATURE: f32 = 0.5;

pub const SUMMARY_APOLOGY: &str =
    "I'm sorry, I'm having trouble generating a calendar summary right now.";

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Message cannot be empty or too long")]
    InvalidMessage,
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::InvalidMessage => AppError::BadRequest(anyhow::Error::new(err)),
        }
    }
}

struct PreparedPrompt {
    prompt: String,
    event_count: usize,
}

pub struct ChatService {
    cache: Arc<CalendarContextCache>,
    assembler: PromptAssembler,
    generator: ResponseGenerator,
    temperature: f32,
}

impl ChatService {
    pub fn new(
        cache: Arc<CalendarContextCache>,
        assembler: PromptAssembler,
        generator: ResponseGenerator,
        temperature: f32,
    ) -> Self {
        Self {
            cache,
            assembler,
            generator,
            temperature,
        }
    }

    pub fn cache(&self) -> &Arc<CalendarContextCache> {
        &self.cache
    }

    async fn prepare(
        &self,
        request: &ChatRequest,
        user_id: &str,
    ) -> Result<PreparedPrompt, ChatError> {
        if !is_valid_message(&request.message) {
            return Err(ChatError::InvalidMessage);
        }

        let intent = extract_intent(&request.message);
        tracing::debug!(user_id, ?intent, "Classified chat message");

        let events = if request.include_calendar_context {
            self.cache.get_events(user_id).await
        } else {
            Vec::new()
        };

        let history = request.conversation_history.as_deref().unwrap_or_default();
        let prompt = self
            .assembler
            .build(&request.message, &events, history, Utc::now());

        Ok(PreparedPrompt {
            prompt,
            event_count: events.len(),
        })
    }

    /// Answer `request` in one piece.
    #[tracing::instrument(skip(self, request))]
    pub async fn process_message(
        &self,
        request: &ChatRequest,
        user_id: &str,
    ) -> Result<ChatResponse, ChatError> {
        let prepared = self.prepare(request, user_id).await?;
        metrics::record_chat_request("single");

        let text = self
            .generator
            .generate_text(prepared.prompt, GenerationParams::assistant(self.temperature))
            .await;
        let response = if text.trim().is_empty() {
            tracing::warn!(user_id, "Model returned an empty reply");
            PROCESSING_APOLOGY.to_string()
        } else {
            text
        };

        tracing::info!(user_id, event_count = prepared.event_count, "Chat message processed");
        Ok(ChatResponse {
            response,
            timestamp: Utc::now(),
            calendar_context_included: prepared.event_count > 0,
            event_count: prepared.event_count,
        })
    }

    /// Unframed text chunks of the reply.
    pub async fn stream_plain(
        &self,
        request: &ChatRequest,
        user_id: &str,
    ) -> Result<Pin<Box<dyn Stream<Item = String> + Send>>, ChatError> {
        let prepared = self.prepare(request, user_id).await?;
        metrics::record_chat_request("stream_plain");

        let chunks = self.generator.generate_checked(
            prepared.prompt,
            GenerationParams::assistant(self.temperature),
            true,
        );
        Ok(streaming::plain(chunks))
    }

    /// Framed reply events and the response id they share.
    pub async fn stream_framed(
        &self,
        request: &ChatRequest,
        user_id: &str,
    ) -> Result<(String, EventStream), ChatError> {
        let prepared = self.prepare(request, user_id).await?;
        metrics::record_chat_request("stream");

        let id = streaming::new_response_id();
        tracing::info!(
            user_id,
            response_id = %id,
            event_count = prepared.event_count,
            "Streaming chat response"
        );

        let chunks = self.generator.generate_checked(
            prepared.prompt,
            GenerationParams::assistant(self.temperature),
            true,
        );
        Ok((id.clone(), streaming::frame(id, chunks)))
    }

    /// Model-written summary of the user's cached events for the period of
    /// `summary_type` around `target`.
    #[tracing::instrument(skip(self))]
    pub async fn calendar_summary(
        &self,
        user_id: &str,
        summary_type: SummaryType,
        target: DateTime<Utc>,
    ) -> SummaryResponse {
        metrics::record_chat_request("summary");

        let events = self.cache.get_events(user_id).await;
        let (prompt, event_count) = self.assembler.build_summary(&events, summary_type, target);

        let text = self
            .generator
            .generate_text(prompt, GenerationParams::assistant(SUMMARY_TEMPERATURE))
            .await;
        let summary = if text.trim().is_empty() {
            tracing::warn!(user_id, "Model returned an empty summary");
            SUMMARY_APOLOGY.to_string()
        } else {
            text
        };

        SummaryResponse {
            summary,
            summary_type,
            event_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalendarEvent, ChatMessage, ChatRole};
    use crate::services::calendar::StaticEventSource;
    use crate::services::calendar_cache::DEFAULT_TTL;
    use crate::services::generator::RetryPolicy;
    use crate::services::prompt::NO_EVENTS;
    use crate::services::providers::mock::{Script, ScriptedTextProvider};
    use futures::StreamExt;

    fn event(id: &str, start: DateTime<Utc>) -> CalendarEvent {
        CalendarEvent {
            id: id.to_string(),
            title: format!("Meeting {}", id),
            start_time: start,
            end_time: start + chrono::Duration::minutes(30),
            description: None,
            location: None,
            attendees: None,
            is_all_day: false,
        }
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            timestamp: Utc::now(),
            include_calendar_context: true,
            conversation_history: None,
        }
    }

    fn service(
        provider: Arc<ScriptedTextProvider>,
        source: Arc<StaticEventSource>,
    ) -> ChatService {
        let cache = Arc::new(CalendarContextCache::new(source, DEFAULT_TTL, 7));
        ChatService::new(
            cache,
            PromptAssembler::new(),
            ResponseGenerator::new(provider, RetryPolicy::default()),
            0.7,
        )
    }

    #[tokio::test]
    async fn test_todays_events_reach_the_prompt() {
        let now = Utc::now();
        let provider = Arc::new(ScriptedTextProvider::replying(&["You have two meetings."]));
        let source = Arc::new(StaticEventSource::new(vec![
            event("1", now + chrono::Duration::minutes(5)),
            event("2", now + chrono::Duration::minutes(10)),
        ]));
        let chat = service(provider.clone(), source);

        let response = chat
            .process_message(&request("What's on my calendar today?"), "u1")
            .await
            .unwrap();

        assert_eq!(response.event_count, 2);
        assert!(response.calendar_context_included);
        assert_eq!(response.response, "You have two meetings.");

        let call = &provider.calls()[0];
        assert!(!call.stream);
        assert_eq!(call.params.temperature, Some(0.7));
        assert!(call.prompt.contains("**Meeting 1**"));
        assert!(call.prompt.contains("What's on my calendar today?"));
    }

    #[tokio::test]
    async fn test_context_can_be_skipped() {
        let provider = Arc::new(ScriptedTextProvider::replying(&["ok"]));
        let source = Arc::new(StaticEventSource::new(vec![event("1", Utc::now())]));
        let chat = service(provider.clone(), source.clone());

        let mut req = request("hello");
        req.include_calendar_context = false;
        let response = chat.process_message(&req, "u1").await.unwrap();

        assert_eq!(response.event_count, 0);
        assert!(!response.calendar_context_included);
        assert_eq!(source.fetch_count(), 0);
        assert!(provider.calls()[0].prompt.contains(NO_EVENTS));
    }

    #[tokio::test]
    async fn test_invalid_message_never_reaches_upstream() {
        let provider = Arc::new(ScriptedTextProvider::replying(&["ok"]));
        let source = Arc::new(StaticEventSource::new(Vec::new()));
        let chat = service(provider.clone(), source.clone());

        let result = chat.process_message(&request("   "), "u1").await;

        assert!(matches!(result, Err(ChatError::InvalidMessage)));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(source.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_history_is_forwarded() {
        let provider = Arc::new(ScriptedTextProvider::replying(&["ok"]));
        let chat = service(provider.clone(), Arc::new(StaticEventSource::new(Vec::new())));

        let mut req = request("and after that?");
        req.conversation_history = Some(vec![ChatMessage {
            id: "m1".to_string(),
            content: "what is first?".to_string(),
            role: ChatRole::User,
            timestamp: Utc::now(),
        }]);
        chat.process_message(&req, "u1").await.unwrap();

        assert!(provider.calls()[0].prompt.contains("User: what is first?"));
    }

    #[tokio::test]
    async fn test_framed_stream_shares_id_and_completes() {
        let provider = Arc::new(ScriptedTextProvider::new(vec![Script::Reply(vec![
            "Hi".to_string(),
            " there".to_string(),
        ])]));
        let chat = service(provider, Arc::new(StaticEventSource::new(Vec::new())));

        let (id, events) = chat.stream_framed(&request("hi"), "u1").await.unwrap();
        let events: Vec<_> = events.collect().await;

        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.id == id));
        assert!(events[2].is_complete && events[2].error.is_none());
    }

    #[tokio::test]
    async fn test_plain_stream_chunks() {
        let provider = Arc::new(ScriptedTextProvider::replying(&["a", "b"]));
        let chat = service(provider, Arc::new(StaticEventSource::new(Vec::new())));

        let chunks: Vec<String> = chat
            .stream_plain(&request("hi"), "u1")
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(chunks, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_summary_uses_lower_temperature() {
        let provider = Arc::new(ScriptedTextProvider::replying(&["Quiet day."]));
        let now = Utc::now();
        let source = Arc::new(StaticEventSource::new(vec![event("1", now)]));
        let chat = service(provider.clone(), source);

        let summary = chat.calendar_summary("u1", SummaryType::Daily, now).await;

        assert_eq!(summary.summary, "Quiet day.");
        assert_eq!(summary.event_count, 1);
        assert_eq!(provider.calls()[0].params.temperature, Some(SUMMARY_TEMPERATURE));
    }

    #[tokio::test]
    async fn test_empty_summary_is_replaced_with_apology() {
        let provider = Arc::new(ScriptedTextProvider::replying(&[""]));
        let chat = service(provider, Arc::new(StaticEventSource::new(Vec::new())));

        let summary = chat
            .calendar_summary("u1", SummaryType::Weekly, Utc::now())
            .await;
        assert_eq!(summary.summary, SUMMARY_APOLOGY);
    }
}
