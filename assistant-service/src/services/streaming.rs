//! Framing for streamed chat responses.
//!
//! [`frame`] turns a sequence of text chunks into [`StreamEvent`]s that always
//! end with exactly one `isComplete: true` event. [`plain`] is the unframed
//! variant used internally. [`into_sse`] exposes framed events as
//! server-sent events, one `data:` message per event.

use axum::response::sse::{Event, Sse};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::pin::Pin;
use uuid::Uuid;

/// Text placed in the `error` field of a failed stream. Details are only logged.
pub const STREAM_ERROR: &str = "Response generation failed";

/// Fallback text for the plain profile when the chunk source fails.
pub const PROCESSING_APOLOGY: &str =
    "I'm sorry, I'm having trouble processing your message right now.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub id: String,
    pub content: String,
    #[serde(rename = "isComplete")]
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamEvent {
    pub fn content(id: &str, content: String) -> Self {
        Self {
            id: id.to_string(),
            content,
            is_complete: false,
            error: None,
        }
    }

    pub fn complete(id: &str) -> Self {
        Self {
            id: id.to_string(),
            content: String::new(),
            is_complete: true,
            error: None,
        }
    }

    pub fn failed(id: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::complete(id)
        }
    }
}

/// Fresh identifier shared by every event of one response.
pub fn new_response_id() -> String {
    Uuid::new_v4().to_string()
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

enum FrameState<S> {
    Streaming { id: String, chunks: Pin<Box<S>> },
    Done,
}

/// Frame `chunks` as events sharing `id`.
///
/// Empty chunks are skipped. The stream ends with a completion event once
/// `chunks` is exhausted, or with a single error event on the first `Err`;
/// nothing is read from `chunks` after that.
pub fn frame<S, E>(id: String, chunks: S) -> EventStream
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    let initial = FrameState::Streaming {
        id,
        chunks: Box::pin(chunks),
    };

    Box::pin(stream::unfold(initial, |state| async move {
        let FrameState::Streaming { id, mut chunks } = state else {
            return None;
        };

        loop {
            match chunks.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => {
                    let event = StreamEvent::content(&id, text);
                    return Some((event, FrameState::Streaming { id, chunks }));
                }
                Some(Err(e)) => {
                    tracing::error!(response_id = %id, error = %e, "Streaming response failed");
                    return Some((StreamEvent::failed(&id, STREAM_ERROR), FrameState::Done));
                }
                None => {
                    tracing::debug!(response_id = %id, "Streaming response complete");
                    return Some((StreamEvent::complete(&id), FrameState::Done));
                }
            }
        }
    }))
}

/// Unframed profile: non-empty chunks as they arrive. A failing source ends
/// the stream with [`PROCESSING_APOLOGY`].
pub fn plain<S, E>(chunks: S) -> Pin<Box<dyn Stream<Item = String> + Send>>
where
    S: Stream<Item = Result<String, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    Box::pin(stream::unfold(Some(Box::pin(chunks)), |state| async move {
        let Some(mut chunks) = state else {
            return None;
        };
        loop {
            match chunks.next().await {
                Some(Ok(text)) if text.is_empty() => continue,
                Some(Ok(text)) => return Some((text, Some(chunks))),
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Plain response stream failed");
                    return Some((PROCESSING_APOLOGY.to_string(), None));
                }
                None => return None,
            }
        }
    }))
}

/// Wrap framed events as an SSE response body.
pub fn into_sse(
    events: EventStream,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + Send> {
    Sse::new(events.map(|event| Event::default().json_data(&event)))
}
