//! Conversation CRUD operations.
//!
//! Every query is scoped by `user_id` so a caller can never see or modify
//! another user's conversations.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::Conversation;
use crate::validation;

/// Create a conversation for a user.
pub async fn create_conversation(
    pool: &SqlitePool,
    user_id: &str,
    title: &str,
) -> Result<Conversation> {
    validation::validate_title(title)?;

    let id = Uuid::new_v4().to_string();
    let conversation = sqlx::query_as::<_, Conversation>(
        r#"
        INSERT INTO conversations (id, user_id, title)
        VALUES (?, ?, ?)
        RETURNING id, user_id, title, created_at, updated_at
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(title.trim())
    .fetch_one(pool)
    .await
    .map_err(|e| DatabaseError::from_write(e, "Conversation", &id))?;

    tracing::debug!(conversation_id = %conversation.id, user_id, "Created conversation");
    Ok(conversation)
}

/// Get a conversation owned by `user_id`.
pub async fn get_conversation(pool: &SqlitePool, user_id: &str, id: &str) -> Result<Conversation> {
    sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM conversations
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Conversation",
        id: id.to_string(),
    })
}

/// List a user's conversations, most recently active first.
///
/// When `search` is set, only titles containing it (case-insensitive) are returned.
pub async fn list_conversations(
    pool: &SqlitePool,
    user_id: &str,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<Vec<Conversation>> {
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", escape_like(s)));

    let rows = sqlx::query_as::<_, Conversation>(
        r#"
        SELECT id, user_id, title, created_at, updated_at
        FROM conversations
        WHERE user_id = ?
          AND (? IS NULL OR title LIKE ? ESCAPE '\')
        ORDER BY updated_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(pattern.as_deref())
    .bind(pattern.as_deref())
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Rename a conversation.
pub async fn update_title(
    pool: &SqlitePool,
    user_id: &str,
    id: &str,
    title: &str,
) -> Result<Conversation> {
    validation::validate_title(title)?;

    sqlx::query_as::<_, Conversation>(
        r#"
        UPDATE conversations
        SET title = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ?
        RETURNING id, user_id, title, created_at, updated_at
        "#,
    )
    .bind(title.trim())
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Conversation",
        id: id.to_string(),
    })
}

/// Bump `updated_at` after new activity.
pub async fn touch(pool: &SqlitePool, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE conversations
        SET updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ?
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete a conversation; messages cascade. Attachments stay in the
/// user's library, unlinked.
pub async fn delete_conversation(pool: &SqlitePool, user_id: &str, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM conversations
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Conversation",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete every conversation a user owns. Returns the number removed.
pub async fn delete_all_for_user(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM conversations
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Count a user's conversations.
pub async fn count_for_user(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM conversations WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
