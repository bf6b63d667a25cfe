//! Error types for the HTTP API.

use async_trait::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use database::{DatabaseError, ValidationError};
use llm_client::LlmError;
use serde::de::DeserializeOwned;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::storage::StorageError;

/// Errors returned by route handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No valid session.
    #[error("Unauthorized")]
    Unauthorized,

    /// A field failed validation.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Body could not be read or decoded.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Model API failure.
    #[error("Model error: {0}")]
    Llm(#[from] LlmError),

    /// Auth provider failure.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Object store failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn invalid_request(details: serde_json::Value) -> Response {
    let body = json!({
        "error": "Invalid request",
        "details": details,
    });
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => error_body(StatusCode::UNAUTHORIZED, "Unauthorized"),
            ApiError::Validation(err) => invalid_request(json!([{
                "field": err.field(),
                "message": err.to_string(),
            }])),
            ApiError::BadRequest(message) => invalid_request(json!([{ "message": message }])),
            ApiError::Database(err) => match err {
                DatabaseError::Validation(err) => ApiError::Validation(err).into_response(),
                DatabaseError::NotFound { entity, .. } => {
                    error_body(StatusCode::NOT_FOUND, &format!("{} not found", entity))
                }
                DatabaseError::ForeignKeyViolation { entity, .. } => error_body(
                    StatusCode::BAD_REQUEST,
                    &format!("{} references a record that does not exist", entity),
                ),
                DatabaseError::AlreadyExists { entity, .. } => {
                    error_body(StatusCode::CONFLICT, &format!("{} already exists", entity))
                }
                other => {
                    tracing::error!("Database error: {}", other);
                    error_body(StatusCode::INTERNAL_SERVER_ERROR, "Database error")
                }
            },
            ApiError::Llm(LlmError::ModelNotAllowed(model)) => invalid_request(json!([{
                "field": "model",
                "message": format!("Model not allowed: {}", model),
            }])),
            ApiError::Llm(err) => {
                tracing::error!("Model API error: {}", err);
                error_body(StatusCode::BAD_GATEWAY, "The model provider request failed")
            }
            ApiError::Auth(AuthError::InvalidToken) => ApiError::Unauthorized.into_response(),
            ApiError::Auth(err) => {
                tracing::error!("Auth provider error: {}", err);
                error_body(StatusCode::BAD_GATEWAY, "The auth provider request failed")
            }
            ApiError::Storage(err) => {
                tracing::error!("Storage error: {}", err);
                error_body(StatusCode::INTERNAL_SERVER_ERROR, "Storage error")
            }
        }
    }
}

/// Result type for route handlers.
pub type Result<T> = std::result::Result<T, ApiError>;

/// JSON body extractor whose rejection is an [`ApiError`].
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> std::result::Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn parts(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_unauthorized_body() {
        let (status, body) = parts(ApiError::Unauthorized).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    #[tokio::test]
    async fn test_validation_details() {
        let err = ValidationError::Empty("title".to_string());
        let (status, body) = parts(ApiError::from(DatabaseError::from(err))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid request");
        assert_eq!(body["details"][0]["field"], "title");
    }

    #[tokio::test]
    async fn test_database_errors() {
        let not_found = DatabaseError::NotFound {
            entity: "Conversation",
            id: "x".to_string(),
        };
        let (status, body) = parts(not_found.into()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Conversation not found");

        let fk = DatabaseError::ForeignKeyViolation {
            entity: "Message",
            id: "x".to_string(),
        };
        assert_eq!(parts(fk.into()).await.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_errors() {
        let err = LlmError::Api {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(parts(err.into()).await.0, StatusCode::BAD_GATEWAY);

        let err = LlmError::ModelNotAllowed("gpt-9".to_string());
        assert_eq!(parts(err.into()).await.0, StatusCode::BAD_REQUEST);
    }
}
