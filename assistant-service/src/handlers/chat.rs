use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use service_core::error::AppError;

use crate::middleware::AuthUser;
use crate::models::{ChatRequest, ChatResponse};
use crate::services::streaming;
use crate::utils::ValidatedJson;
use crate::AppState;

pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let response = state
        .chat
        .process_message(&request, auth.user_id())
        .await?;
    Ok(Json(response))
}

/// Server-sent events, one framed chunk per `data:` message.
pub async fn chat_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedJson(request): ValidatedJson<ChatRequest>,
) -> Result<Response, AppError> {
    let (_, events) = state.chat.stream_framed(&request, auth.user_id()).await?;

    Ok((
        [(header::CACHE_CONTROL, "no-cache")],
        streaming::into_sse(events),
    )
        .into_response())
}
