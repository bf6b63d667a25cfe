//! Message persistence.

use serde_json::Value;
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{Message, MessageStatus, NewMessage};
use crate::validation;

const MESSAGE_COLUMNS: &str = "m.id, m.conversation_id, m.role, m.content, m.model, \
     m.prompt_tokens, m.completion_tokens, m.total_tokens, m.response_time_ms, \
     m.status, m.metadata, m.created_at";

/// Insert a message into a conversation.
///
/// Returns [`DatabaseError::ForeignKeyViolation`] when the conversation does not exist.
pub async fn insert_message(pool: &SqlitePool, message: &NewMessage) -> Result<Message> {
    validation::validate_message_content(&message.content)?;

    let id = Uuid::new_v4().to_string();
    let usage = message.usage.unwrap_or_default();
    let has_usage = message.usage.is_some();

    let record = sqlx::query_as::<_, Message>(
        r#"
        INSERT INTO messages (
            id, conversation_id, role, content, model,
            prompt_tokens, completion_tokens, total_tokens,
            response_time_ms, status, metadata
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, conversation_id, role, content, model,
            prompt_tokens, completion_tokens, total_tokens,
            response_time_ms, status, metadata, created_at
        "#,
    )
    .bind(&id)
    .bind(&message.conversation_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(message.model.as_deref())
    .bind(has_usage.then_some(usage.prompt_tokens))
    .bind(has_usage.then_some(usage.completion_tokens))
    .bind(has_usage.then_some(usage.total_tokens))
    .bind(message.response_time_ms)
    .bind(message.status.as_str())
    .bind(Json(&message.metadata))
    .fetch_one(pool)
    .await
    .map_err(|e| DatabaseError::from_write(e, "Message", &message.conversation_id))?;

    Ok(record)
}

/// List messages of a user's conversation in chronological order.
pub async fn list_messages(
    pool: &SqlitePool,
    user_id: &str,
    conversation_id: &str,
) -> Result<Vec<Message>> {
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        WHERE m.conversation_id = ? AND c.user_id = ?
        ORDER BY m.created_at ASC, m.rowid ASC
        "#
    );

    let rows = sqlx::query_as::<_, Message>(&query)
        .bind(conversation_id)
        .bind(user_id)
        .fetch_all(pool)
        .await?;

    Ok(rows)
}

/// Get a single message owned (through its conversation) by `user_id`.
pub async fn get_message(pool: &SqlitePool, user_id: &str, id: &str) -> Result<Message> {
    let query = format!(
        r#"
        SELECT {MESSAGE_COLUMNS}
        FROM messages m
        JOIN conversations c ON c.id = m.conversation_id
        WHERE m.id = ? AND c.user_id = ?
        "#
    );

    sqlx::query_as::<_, Message>(&query)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| DatabaseError::NotFound {
            entity: "Message",
            id: id.to_string(),
        })
}

/// Update content, status and/or metadata of a message. `None` leaves a field as is.
pub async fn update_message(
    pool: &SqlitePool,
    user_id: &str,
    id: &str,
    content: Option<&str>,
    status: Option<MessageStatus>,
    metadata: Option<&Value>,
) -> Result<Message> {
    if let Some(content) = content {
        validation::validate_message_content(content)?;
    }

    let result = sqlx::query(
        r#"
        UPDATE messages
        SET content = COALESCE(?, content),
            status = COALESCE(?, status),
            metadata = COALESCE(?, metadata)
        WHERE id = ?
          AND conversation_id IN (SELECT id FROM conversations WHERE user_id = ?)
        "#,
    )
    .bind(content)
    .bind(status.map(|s| s.as_str()))
    .bind(metadata.map(Json))
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Message",
            id: id.to_string(),
        });
    }

    get_message(pool, user_id, id).await
}

/// Delete a message owned by `user_id`.
pub async fn delete_message(pool: &SqlitePool, user_id: &str, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM messages
        WHERE id = ?
          AND conversation_id IN (SELECT id FROM conversations WHERE user_id = ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Message",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Count messages in a conversation.
pub async fn count_for_conversation(pool: &SqlitePool, conversation_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM messages WHERE conversation_id = ?
        "#,
    )
    .bind(conversation_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageRole, TokenUsage};
    use crate::{conversation, Database};
    use serde_json::json;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_insert_and_list_in_order() {
        let db = test_db().await;
        let conv = conversation::create_conversation(db.pool(), "u", "Chat").await.unwrap();

        insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::User, "Hi"))
            .await
            .unwrap();

        let mut reply = NewMessage::new(&conv.id, MessageRole::Assistant, "Hello!");
        reply.model = Some("gpt-4o-mini".to_string());
        reply.usage = Some(TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 3,
            total_tokens: 13,
        });
        reply.response_time_ms = Some(420);
        reply.metadata = json!({"tool_results": []});
        insert_message(db.pool(), &reply).await.unwrap();

        let messages = list_messages(db.pool(), "u", &conv.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].total_tokens, Some(13));
        assert_eq!(messages[1].metadata.0, json!({"tool_results": []}));
        assert_eq!(messages[0].prompt_tokens, None);

        // Other users see nothing.
        assert!(list_messages(db.pool(), "other", &conv.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_conversation_is_foreign_key_violation() {
        let db = test_db().await;
        let result = insert_message(
            db.pool(),
            &NewMessage::new("00000000-0000-4000-8000-000000000000", MessageRole::User, "Hi"),
        )
        .await;
        assert!(matches!(result, Err(DatabaseError::ForeignKeyViolation { .. })));
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = test_db().await;
        let conv = conversation::create_conversation(db.pool(), "u", "Chat").await.unwrap();
        let msg = insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::Assistant, "Draft"))
            .await
            .unwrap();

        let updated = update_message(
            db.pool(),
            "u",
            &msg.id,
            Some("Final"),
            Some(MessageStatus::Failed),
            None,
        )
        .await
        .unwrap();
        assert_eq!(updated.content, "Final");
        assert_eq!(updated.status, "failed");

        let denied = update_message(db.pool(), "other", &msg.id, Some("x"), None, None).await;
        assert!(denied.unwrap_err().is_not_found());

        delete_message(db.pool(), "u", &msg.id).await.unwrap();
        assert_eq!(count_for_conversation(db.pool(), &conv.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_conversation_delete_cascades() {
        let db = test_db().await;
        let conv = conversation::create_conversation(db.pool(), "u", "Chat").await.unwrap();
        insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::User, "one"))
            .await
            .unwrap();
        insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::Assistant, "two"))
            .await
            .unwrap();

        conversation::delete_conversation(db.pool(), "u", &conv.id).await.unwrap();
        assert_eq!(count_for_conversation(db.pool(), &conv.id).await.unwrap(), 0);
    }
}
