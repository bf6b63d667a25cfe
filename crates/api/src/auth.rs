//! Authentication against a third-party auth provider.
//!
//! Requests carry an access token either as `Authorization: Bearer ...` or
//! in the `access_token` cookie set by the OAuth callback. Tokens are
//! verified by an [`AuthProvider`]; route handlers use the [`MaybeUser`] and
//! [`RequireUser`] extractors.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

/// Cookie holding the access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Errors from the auth provider.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token is missing, expired or forged.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// No auth provider is configured.
    #[error("Authentication is not configured")]
    NotConfigured,

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The provider rejected the request.
    #[error("Auth provider error ({status}): {message}")]
    Provider { status: u16, message: String },
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::Network(err.without_url().to_string())
    }
}

/// A verified user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    /// Provider subject id; owns all rows created by the user.
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Tokens returned by a code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of `access_token` in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    pub user: AuthUser,
}

/// Verifies tokens and manages users at the auth provider.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve an access token to its user.
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError>;

    /// Exchange an OAuth authorization code for a session.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError>;

    /// Delete a user account at the provider.
    async fn delete_user(&self, user_id: &str) -> Result<(), AuthError>;
}

/// Provider used when no auth backend is configured: every request is anonymous.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAuth;

#[async_trait]
impl AuthProvider for NoAuth {
    async fn verify(&self, _token: &str) -> Result<AuthUser, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn exchange_code(&self, _code: &str, _verifier: Option<&str>) -> Result<Session, AuthError> {
        Err(AuthError::NotConfigured)
    }

    async fn delete_user(&self, _user_id: &str) -> Result<(), AuthError> {
        Err(AuthError::NotConfigured)
    }
}

/// GoTrue-style REST auth provider.
///
/// Uses `GET /auth/v1/user`, `POST /auth/v1/token?grant_type=pkce` and
/// `DELETE /auth/v1/admin/users/{id}`.
#[derive(Debug, Clone)]
pub struct RemoteAuth {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    #[serde(alias = "error_description", alias = "msg", alias = "error")]
    message: Option<String>,
}

impl RemoteAuth {
    /// Create a provider client. `api_key` must be allowed to delete users.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, AuthError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AuthError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthError::InvalidToken);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ProviderError>(&text)
            .ok()
            .and_then(|e| e.message)
            .unwrap_or(text);

        Err(AuthError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl AuthProvider for RemoteAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(token)
            .send()
            .await?;

        let user: AuthUser = Self::check(response).await?.json().await?;
        debug!(user_id = %user.id, "Verified access token");
        Ok(user)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "pkce")])
            .header("apikey", &self.api_key)
            .json(&json!({
                "auth_code": code,
                "code_verifier": code_verifier,
            }))
            .send()
            .await?;

        Ok(Self::check(response).await?.json().await?)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .delete(format!("{}/auth/v1/admin/users/{}", self.base_url, user_id))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

/// Read the access token from the bearer header or the session cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    cookie_value(headers, ACCESS_TOKEN_COOKIE)
}

/// Read a non-empty cookie from the request headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<AuthUser>, AuthError> {
    let Some(token) = extract_token(&parts.headers) else {
        return Ok(None);
    };

    match state.auth.verify(&token).await {
        Ok(user) => Ok(Some(user)),
        Err(AuthError::InvalidToken) | Err(AuthError::NotConfigured) => Ok(None),
        Err(err) => Err(err),
    }
}

/// The signed-in user, if any. Never rejects.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthUser>);

#[async_trait]
impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(user) => Ok(MaybeUser(user)),
            Err(err) => {
                warn!(error = %err, "Token verification failed, continuing anonymously");
                Ok(MaybeUser(None))
            }
        }
    }
}

/// The signed-in user; rejects with 401 otherwise.
#[derive(Debug, Clone)]
pub struct RequireUser(pub AuthUser);

#[async_trait]
impl FromRequestParts<AppState> for RequireUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        match authenticate(parts, state).await {
            Ok(Some(user)) => Ok(RequireUser(user)),
            Ok(None) => Err(ApiError::Unauthorized),
            Err(err) => {
                warn!(error = %err, "Token verification failed");
                Err(ApiError::Unauthorized)
            }
        }
    }
}
