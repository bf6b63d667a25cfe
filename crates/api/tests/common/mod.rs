//! Shared fixtures for router tests.
#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use chat_api::{app, AppState, AuthError, AuthProvider, AuthUser, Config, LocalStore, Session};
use database::Database;
use llm_client::{LlmClient, LlmConfig};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const PUBLIC_URL: &str = "http://localhost:8787";

/// Accepts `token-{user_id}` and the OAuth code `good-code`.
pub struct TokenAuth;

#[async_trait]
impl AuthProvider for TokenAuth {
    async fn verify(&self, token: &str) -> Result<AuthUser, AuthError> {
        token
            .strip_prefix("token-")
            .map(|id| AuthUser {
                id: id.to_string(),
                email: None,
            })
            .ok_or(AuthError::InvalidToken)
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Session, AuthError> {
        if code != "good-code" {
            return Err(AuthError::InvalidToken);
        }
        Ok(Session {
            access_token: "token-alice".to_string(),
            refresh_token: None,
            expires_in: Some(3600),
            user: AuthUser {
                id: "alice".to_string(),
                email: Some("alice@example.com".to_string()),
            },
        })
    }

    async fn delete_user(&self, _user_id: &str) -> Result<(), AuthError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    /// Stands in for the model API.
    pub llm: mockito::ServerGuard,
    pub storage: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_auth(Arc::new(TokenAuth)).await
    }

    pub async fn with_auth(auth: Arc<dyn AuthProvider>) -> Self {
        let llm = mockito::Server::new_async().await;
        let storage = tempfile::tempdir().unwrap();

        let config = Config {
            storage_dir: storage.path().to_path_buf(),
            public_url: PUBLIC_URL.to_string(),
            generate_titles: false,
            llm: LlmConfig::builder()
                .api_url(llm.url())
                .api_key("sk-test")
                .model("test-model")
                .build(),
            ..Config::default()
        };

        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();

        let client = LlmClient::new(config.llm.clone()).unwrap();
        let store = Arc::new(LocalStore::new(storage.path(), PUBLIC_URL).await.unwrap());
        let state = AppState::new(config, db, client, auth, store);

        Self {
            router: app(state.clone()),
            state,
            llm,
            storage,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, bytes.to_vec())
    }

    pub async fn json(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, bytes) = self.send(request).await;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    /// Answer every model call with a plain text stream.
    pub async fn mock_reply(&mut self, text: &str) -> mockito::Mock {
        let chunk = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
        let body = format!(
            "data: {}\n\n\
             data: {{\"choices\":[{{\"delta\":{{}},\"finish_reason\":\"stop\"}}]}}\n\n\
             data: {{\"choices\":[],\"usage\":{{\"prompt_tokens\":12,\"completion_tokens\":3,\"total_tokens\":15}}}}\n\n\
             data: [DONE]\n\n",
            chunk
        );

        self.llm
            .mock("POST", "/chat/completions")
            .with_header("content-type", "text/event-stream")
            .with_body(body)
            .create_async()
            .await
    }
}

/// Build a request, optionally signed in as `user` and with a JSON body.
pub fn request(method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer token-{}", user));
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
