//! Conversation routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use database::validation::{validate_title, validate_uuid};
use database::{conversation, message, Conversation};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::auth::RequireUser;
use crate::error::{ApiJson, Result};
use crate::routes::messages::{with_attachments, MessageView};
use crate::routes::page;
use crate::state::AppState;

/// Title used when none can be derived.
pub const DEFAULT_TITLE: &str = "New Chat";

/// Longest draft title taken from a first message.
const DRAFT_TITLE_CHARS: usize = 80;

/// Query parameters for listing conversations.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A page of conversations.
#[derive(Serialize)]
pub struct ConversationList {
    pub conversations: Vec<Conversation>,
    /// All of the user's conversations, ignoring `search` and paging.
    pub total: i64,
}

/// Request to create a conversation.
#[derive(Debug, Default, Deserialize)]
pub struct CreateRequest {
    #[serde(default)]
    pub title: Option<String>,
}

/// Request to rename a conversation.
#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub title: String,
}

/// A conversation with its messages.
#[derive(Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<MessageView>,
}

/// Trim a title and collapse inner whitespace.
pub(crate) fn normalize_title(title: &str) -> String {
    title.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title for a conversation started by `first_message`.
pub(crate) fn draft_title(first_message: &str) -> String {
    let title: String = normalize_title(first_message)
        .chars()
        .take(DRAFT_TITLE_CHARS)
        .collect();

    match title.trim_end() {
        "" => DEFAULT_TITLE.to_string(),
        title => title.to_string(),
    }
}

/// Create a conversation, sharing the result with identical requests
/// (same user and title) made within the coalescing window.
pub(crate) async fn create_coalesced(
    state: &AppState,
    user_id: &str,
    title: &str,
) -> Result<Conversation> {
    let key = format!("{}:{}", user_id, title);
    let conversation = state
        .conversations
        .run(key, || conversation::create_conversation(state.db.pool(), user_id, title))
        .await?;
    Ok(conversation)
}

/// List the caller's conversations, most recently active first.
pub async fn list(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ConversationList>> {
    let (limit, offset) = page(query.limit, query.offset);
    let pool = state.db.pool();

    let conversations =
        conversation::list_conversations(pool, &user.id, query.search.as_deref(), limit, offset)
            .await?;
    let total = conversation::count_for_user(pool, &user.id).await?;

    Ok(Json(ConversationList {
        conversations,
        total,
    }))
}

/// Create a conversation.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(req): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<Conversation>)> {
    let title = req
        .title
        .as_deref()
        .map(normalize_title)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    validate_title(&title)?;

    let conversation = create_coalesced(&state, &user.id, &title).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Get a conversation with its messages.
pub async fn get_one(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetail>> {
    validate_uuid("id", &id)?;
    let pool = state.db.pool();

    let conversation = conversation::get_conversation(pool, &user.id, &id).await?;
    let messages = message::list_messages(pool, &user.id, &id).await?;

    Ok(Json(ConversationDetail {
        conversation,
        messages: with_attachments(&state.db, messages).await?,
    }))
}

/// Rename a conversation.
pub async fn rename(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RenameRequest>,
) -> Result<Json<Conversation>> {
    validate_uuid("id", &id)?;
    let title = normalize_title(&req.title);

    let conversation =
        conversation::update_title(state.db.pool(), &user.id, &id, &title).await?;
    Ok(Json(conversation))
}

/// Delete a conversation and its messages.
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    validate_uuid("id", &id)?;

    conversation::delete_conversation(state.db.pool(), &user.id, &id).await?;
    info!(conversation_id = %id, user_id = %user.id, "Deleted conversation");

    Ok(Json(json!({ "success": true })))
}

/// List a conversation's messages in chronological order.
pub async fn messages(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Vec<MessageView>>> {
    validate_uuid("id", &id)?;
    let pool = state.db.pool();

    // Distinguishes "not yours" from "no messages yet".
    conversation::get_conversation(pool, &user.id, &id).await?;
    let messages = message::list_messages(pool, &user.id, &id).await?;

    Ok(Json(with_attachments(&state.db, messages).await?))
}
