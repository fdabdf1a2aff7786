use axum::{
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use service_core::error::ErrorResponse;
use validator::Validate;

fn reject(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            details: None,
        }),
    )
        .into_response()
}

/// JSON body that has passed its `validator` rules.
///
/// Malformed JSON is rejected with 400, rule violations with 422.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| reject(StatusCode::BAD_REQUEST, format!("Json parse error: {}", e)))?;

        value.validate().map_err(|e| {
            reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation error: {}", e),
            )
        })?;

        Ok(ValidatedJson(value))
    }
}

/// Query string counterpart of [`ValidatedJson`].
pub struct ValidatedQuery<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequestParts<S> for ValidatedQuery<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| reject(StatusCode::BAD_REQUEST, format!("Query parse error: {}", e)))?;

        value.validate().map_err(|e| {
            reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Validation error: {}", e),
            )
        })?;

        Ok(ValidatedQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CalendarEventsQuery, ChatRequest};
    use axum::{body::Body, routing::get, routing::post, Router};
    use tower::util::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/chat",
                post(|ValidatedJson(req): ValidatedJson<ChatRequest>| async move { req.message }),
            )
            .route(
                "/events",
                get(|ValidatedQuery(q): ValidatedQuery<CalendarEventsQuery>| async move {
                    q.days_ahead.to_string()
                }),
            )
    }

    async fn status_of(request: axum::http::Request<Body>) -> StatusCode {
        app().oneshot(request).await.unwrap().status()
    }

    fn post_json(body: &str) -> axum::http::Request<Body> {
        axum::http::Request::post("/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_uri(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_json_rejections() {
        assert_eq!(status_of(post_json(r#"{"message":"hi"}"#)).await, StatusCode::OK);
        assert_eq!(status_of(post_json("{not json")).await, StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(post_json(r#"{"message":""}"#)).await,
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_query_rejections() {
        assert_eq!(status_of(get_uri("/events")).await, StatusCode::OK);
        assert_eq!(status_of(get_uri("/events?days_ahead=30")).await, StatusCode::OK);
        assert_eq!(
            status_of(get_uri("/events?days_ahead=31")).await,
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(get_uri("/events?days_ahead=soon")).await,
            StatusCode::BAD_REQUEST
        );
    }
}
