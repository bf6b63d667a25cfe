//! Message routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use database::validation::{parse_role, parse_status, validate_uuid};
use database::{
    attachment, conversation, message, Database, Message, MessageAttachment, NewMessage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::auth::RequireUser;
use crate::error::{ApiError, ApiJson, Result};
use crate::state::AppState;

/// A message with its attachments.
#[derive(Debug, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub attachments: Vec<MessageAttachment>,
}

/// Load the attachments of each message.
pub(crate) async fn with_attachments(
    db: &Database,
    messages: Vec<Message>,
) -> Result<Vec<MessageView>> {
    let mut views = Vec::with_capacity(messages.len());
    for message in messages {
        let attachments = attachment::list_for_message(db.pool(), &message.id).await?;
        views.push(MessageView {
            message,
            attachments,
        });
    }
    Ok(views)
}

/// Request to add a message to a conversation.
#[derive(Debug, Deserialize)]
pub struct CreateRequest {
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
    /// URLs of the caller's earlier uploads to link to the message.
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Request to edit a message. Absent fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Add a message to one of the caller's conversations.
pub async fn create(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(req): ApiJson<CreateRequest>,
) -> Result<(StatusCode, Json<MessageView>)> {
    validate_uuid("conversation_id", &req.conversation_id)?;
    let role = parse_role(&req.role)?;
    let status = req.status.as_deref().map(parse_status).transpose()?;
    if req.metadata.as_ref().is_some_and(|m| !m.is_object()) {
        return Err(ApiError::BadRequest("metadata must be an object".to_string()));
    }

    let pool = state.db.pool();
    conversation::get_conversation(pool, &user.id, &req.conversation_id).await?;

    let mut new_message = NewMessage::new(&req.conversation_id, role, req.content);
    new_message.model = req.model;
    if let Some(status) = status {
        new_message.status = status;
    }
    if let Some(metadata) = req.metadata {
        new_message.metadata = metadata;
    }

    let message = message::insert_message(pool, &new_message).await?;
    if !req.attachments.is_empty() {
        let linked =
            attachment::link_to_message(pool, &user.id, &message.id, &req.attachments).await?;
        debug!(message_id = %message.id, linked, "Linked attachments");
    }
    conversation::touch(pool, &req.conversation_id).await?;

    let attachments = attachment::list_for_message(pool, &message.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(MessageView {
            message,
            attachments,
        }),
    ))
}

/// Edit a message's content, status or metadata.
pub async fn update(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateRequest>,
) -> Result<Json<Message>> {
    validate_uuid("id", &id)?;
    let status = req.status.as_deref().map(parse_status).transpose()?;
    if req.metadata.as_ref().is_some_and(|m| !m.is_object()) {
        return Err(ApiError::BadRequest("metadata must be an object".to_string()));
    }

    let message = message::update_message(
        state.db.pool(),
        &user.id,
        &id,
        req.content.as_deref(),
        status,
        req.metadata.as_ref(),
    )
    .await?;

    Ok(Json(message))
}

/// Delete a message.
pub async fn remove(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    validate_uuid("id", &id)?;

    message::delete_message(state.db.pool(), &user.id, &id).await?;
    Ok(Json(json!({ "success": true })))
}
