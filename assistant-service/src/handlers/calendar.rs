use axum::{extract::State, Json};
use chrono::Utc;
use service_core::error::AppError;

use crate::middleware::AuthUser;
use crate::models::{
    CalendarEventsQuery, CalendarEventsResponse, SummaryQuery, SummaryResponse, SummaryType,
};
use crate::services::CalendarError;
use crate::utils::ValidatedQuery;
use crate::AppState;

/// Upcoming events straight from the calendar API.
#[tracing::instrument(skip_all, fields(user_id = %auth.user_id()))]
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedQuery(query): ValidatedQuery<CalendarEventsQuery>,
) -> Result<Json<CalendarEventsResponse>, AppError> {
    let events = state
        .events
        .fetch_events(auth.user_id(), query.days_ahead)
        .await
        .map_err(|e| match e {
            CalendarError::NotAuthenticated => {
                AppError::Unauthorized(anyhow::anyhow!("Calendar access expired, sign in again"))
            }
            other => {
                tracing::error!(error = %other, "Failed to fetch calendar events");
                AppError::BadGateway("Failed to fetch calendar events".to_string())
            }
        })?;

    Ok(Json(CalendarEventsResponse::new(events, query.days_ahead)))
}

pub async fn summary(
    State(state): State<AppState>,
    auth: AuthUser,
    ValidatedQuery(query): ValidatedQuery<SummaryQuery>,
) -> Json<SummaryResponse> {
    let summary_type = SummaryType::parse(&query.summary_type);
    Json(
        state
            .chat
            .calendar_summary(auth.user_id(), summary_type, Utc::now())
            .await,
    )
}
