//! Per-user data: preferences, memories, files, history and the account.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use database::validation::{parse_memory_type, validate_upload, validate_uuid};
use database::{
    attachment, conversation, memory, preference, AttachmentSource, MemoryType,
    MessageAttachment, NewAttachment, PreferenceUpdate, UserMemory, UserPreference,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::{AuthError, RequireUser};
use crate::error::{ApiError, ApiJson, Result};
use crate::routes::auth_callback::session_cookie;
use crate::routes::conversations::{ConversationList, ListQuery};
use crate::routes::page;
use crate::state::AppState;
use crate::storage::{object_key, user_prefix};

/// Multipart field carrying the upload.
const FILE_FIELD: &str = "file";

// ---- Preferences ----

/// Get the caller's preferences (`null` when none were saved).
pub async fn get_preferences(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Option<UserPreference>>> {
    Ok(Json(state.preferences(&user.id).await?))
}

/// Create or replace the caller's preferences.
pub async fn put_preferences(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(update): ApiJson<PreferenceUpdate>,
) -> Result<Json<UserPreference>> {
    let saved = preference::upsert_preferences(state.db.pool(), &user.id, &update).await?;
    state.invalidate_user(&user.id).await;

    info!(user_id = %user.id, "Updated preferences");
    Ok(Json(saved))
}

// ---- Memories ----

/// Request to remember something about the caller.
#[derive(Debug, Deserialize)]
pub struct MemoryRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub memory_type: Option<String>,
}

/// List the caller's active memories.
pub async fn list_memories(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Vec<UserMemory>>> {
    Ok(Json(memory::list_active(state.db.pool(), &user.id).await?))
}

/// Save or replace a memory.
pub async fn save_memory(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(req): ApiJson<MemoryRequest>,
) -> Result<(StatusCode, Json<UserMemory>)> {
    let memory_type = match req.memory_type.as_deref() {
        Some(value) => parse_memory_type(value)?,
        None => MemoryType::Fact,
    };

    let saved =
        memory::upsert_memory(state.db.pool(), &user.id, &req.key, &req.value, memory_type)
            .await?;
    state.invalidate_user(&user.id).await;

    Ok((StatusCode::CREATED, Json(saved)))
}

/// Forget every memory. Rows stay, marked inactive.
pub async fn clear_memories(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>> {
    let deactivated = memory::deactivate_all(state.db.pool(), &user.id).await?;
    state.invalidate_user(&user.id).await;

    info!(user_id = %user.id, deactivated, "Cleared memories");
    Ok(Json(json!({ "deactivated": deactivated })))
}

/// Forget one memory.
pub async fn forget_memory(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    validate_uuid("id", &id)?;

    memory::deactivate_memory(state.db.pool(), &user.id, &id).await?;
    state.invalidate_user(&user.id).await;

    Ok(Json(json!({ "success": true })))
}

// ---- Files ----

/// Paging for file and image listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// List the caller's uploads and generated images, newest first.
pub async fn list_files(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageAttachment>>> {
    let (limit, offset) = page(query.limit, query.offset);
    let files = attachment::list_for_user(state.db.pool(), &user.id, false, limit, offset).await?;
    Ok(Json(files))
}

/// List the caller's images only.
pub async fn list_images(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<MessageAttachment>>> {
    let (limit, offset) = page(query.limit, query.offset);
    let images = attachment::list_for_user(state.db.pool(), &user.id, true, limit, offset).await?;
    Ok(Json(images))
}

/// Upload a file (multipart field `file`). The record stays unlinked until
/// a message references its URL.
pub async fn upload_file(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<MessageAttachment>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("file").to_string();
        let file_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        upload = Some((file_name, file_type, bytes));
        break;
    }

    let Some((file_name, file_type, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!(
            "multipart field '{}' is required",
            FILE_FIELD
        )));
    };
    validate_upload(&file_type, bytes.len())?;

    let key = object_key(&user.id, &file_name);
    let stored = state.store.put(&key, &bytes).await?;

    let new_attachment = NewAttachment {
        message_id: None,
        user_id: user.id.clone(),
        file_name,
        file_type,
        file_size: bytes.len() as i64,
        url: stored.url,
        storage_path: Some(stored.key),
        source: AttachmentSource::Upload,
    };

    let record = match attachment::insert_attachment(state.db.pool(), &new_attachment).await {
        Ok(record) => record,
        Err(e) => {
            if let Err(cleanup) = state.store.delete(&key).await {
                warn!(key = %key, "Failed to remove orphaned upload: {}", cleanup);
            }
            return Err(e.into());
        }
    };

    info!(
        user_id = %user.id,
        attachment_id = %record.id,
        size = record.file_size,
        "Stored upload"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

/// Delete an upload and its stored object.
pub async fn delete_file(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    validate_uuid("id", &id)?;
    let pool = state.db.pool();

    let record = attachment::get_attachment(pool, &user.id, &id).await?;
    attachment::delete_attachment(pool, &user.id, &id).await?;

    if let Some(key) = record.storage_path.as_deref() {
        if let Err(e) = state.store.delete(key).await {
            warn!(key, "Failed to remove stored object: {}", e);
        }
    }

    Ok(Json(json!({ "success": true })))
}

// ---- History ----

/// Search the caller's conversation history.
pub async fn history(
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

/// Delete every conversation (and so every message) of the caller.
pub async fn clear_history(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<Json<Value>> {
    let deleted = conversation::delete_all_for_user(state.db.pool(), &user.id).await?;

    info!(user_id = %user.id, deleted, "Cleared conversation history");
    Ok(Json(json!({ "deleted": deleted })))
}

// ---- Account ----

/// Delete all of the caller's data, then the account at the auth provider.
pub async fn delete_account(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<impl IntoResponse> {
    let pool = state.db.pool();

    let keys = attachment::delete_all_for_user(pool, &user.id).await?;
    let conversations = conversation::delete_all_for_user(pool, &user.id).await?;
    let memories = memory::delete_all_for_user(pool, &user.id).await?;
    preference::delete_preferences(pool, &user.id).await?;
    state.invalidate_user(&user.id).await;

    for key in &keys {
        if let Err(e) = state.store.delete(key).await {
            warn!(key = %key, "Failed to remove stored object: {}", e);
        }
    }
    // Catches objects whose records are already gone.
    let prefix = user_prefix(&user.id);
    if let Err(e) = state.store.delete_prefix(&prefix).await {
        warn!(prefix = %prefix, "Failed to remove user objects: {}", e);
    }

    match state.auth.delete_user(&user.id).await {
        Ok(()) => {}
        Err(AuthError::NotConfigured) => {
            warn!(user_id = %user.id, "Auth provider has no admin access; account left in place");
        }
        Err(e) => return Err(e.into()),
    }

    info!(
        user_id = %user.id,
        conversations,
        memories,
        files = keys.len(),
        "Deleted account"
    );

    let secure = state.config.public_url.starts_with("https://");
    Ok((
        [(SET_COOKIE, session_cookie("", 0, secure))],
        Json(json!({ "success": true })),
    ))
}
