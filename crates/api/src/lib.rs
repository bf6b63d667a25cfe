//! HTTP API for the chat server.
//!
//! Serves the streaming chat endpoint, conversation and message CRUD,
//! per-user preferences, memories, files and history, the OAuth callback,
//! and stored uploads under `/files`.

pub mod auth;
pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod storage;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub use auth::{AuthError, AuthProvider, AuthUser, NoAuth, RemoteAuth, Session};
pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::AppState;
pub use storage::{LocalStore, ObjectStore, StorageError, FILES_ROUTE};

/// Build the application: all routes, stored files, tracing and CORS.
pub fn app(state: AppState) -> Router {
    let files = ServeDir::new(&state.config.storage_dir);

    routes::router()
        .nest_service(FILES_ROUTE, files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
