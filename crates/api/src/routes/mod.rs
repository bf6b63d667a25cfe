//! Route handlers for the chat API.

pub mod auth_callback;
pub mod chat;
pub mod conversations;
pub mod health;
pub mod messages;
pub mod user;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post};
use axum::Router;
use database::validation::MAX_UPLOAD_BYTES;

use crate::state::AppState;

/// Multipart framing allowance on top of the largest accepted upload.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Build the router with all routes.
pub fn router() -> Router<AppState> {
    Router::new()
        // Health check
        .route("/health", get(health::health))
        // OAuth
        .route("/auth/callback", get(auth_callback::callback))
        // Chat
        .route("/api/chat", post(chat::chat))
        // Conversations and messages
        .route(
            "/api/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route(
            "/api/conversations/:id",
            get(conversations::get_one)
                .patch(conversations::rename)
                .delete(conversations::remove),
        )
        .route("/api/conversations/:id/messages", get(conversations::messages))
        .route("/api/messages", post(messages::create))
        .route(
            "/api/messages/:id",
            patch(messages::update).delete(messages::remove),
        )
        // User data
        .route(
            "/api/user/preferences",
            get(user::get_preferences).put(user::put_preferences),
        )
        .route(
            "/api/user/memory",
            get(user::list_memories)
                .post(user::save_memory)
                .delete(user::clear_memories),
        )
        .route("/api/user/memory/:id", delete(user::forget_memory))
        .route(
            "/api/user/files",
            get(user::list_files)
                .post(user::upload_file)
                .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + UPLOAD_OVERHEAD_BYTES)),
        )
        .route("/api/user/files/:id", delete(user::delete_file))
        .route("/api/user/images", get(user::list_images))
        .route(
            "/api/user/history",
            get(user::history).delete(user::clear_history),
        )
        .route("/api/user/account", delete(user::delete_account))
}

/// Clamp `limit`/`offset` query parameters: `limit` defaults to 50 and is
/// capped at 100; negative values become 0.
pub(crate) fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    const DEFAULT_LIMIT: i64 = 50;
    const MAX_LIMIT: i64 = 100;

    let limit = limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = offset.unwrap_or(0).max(0);
    (limit, offset)
}
