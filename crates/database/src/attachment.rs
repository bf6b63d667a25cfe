//! Message attachment records (uploaded files and generated images).

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{MessageAttachment, NewAttachment};

/// Insert an attachment record.
pub async fn insert_attachment(
    pool: &SqlitePool,
    attachment: &NewAttachment,
) -> Result<MessageAttachment> {
    let id = Uuid::new_v4().to_string();

    let record = sqlx::query_as::<_, MessageAttachment>(
        r#"
        INSERT INTO message_attachments (
            id, message_id, user_id, file_name, file_type, file_size, url, storage_path, source
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        RETURNING id, message_id, user_id, file_name, file_type, file_size, url,
            storage_path, source, created_at
        "#,
    )
    .bind(&id)
    .bind(attachment.message_id.as_deref())
    .bind(&attachment.user_id)
    .bind(&attachment.file_name)
    .bind(&attachment.file_type)
    .bind(attachment.file_size)
    .bind(&attachment.url)
    .bind(attachment.storage_path.as_deref())
    .bind(attachment.source.as_str())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        DatabaseError::from_write(
            e,
            "Attachment",
            attachment.message_id.as_deref().unwrap_or(&id),
        )
    })?;

    Ok(record)
}

/// Link a user's unlinked uploads to a message. Returns how many rows changed.
pub async fn link_to_message(
    pool: &SqlitePool,
    user_id: &str,
    message_id: &str,
    urls: &[String],
) -> Result<u64> {
    let mut linked = 0;
    for url in urls {
        let result = sqlx::query(
            r#"
            UPDATE message_attachments
            SET message_id = ?
            WHERE user_id = ? AND url = ? AND message_id IS NULL
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(url)
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::from_write(e, "Attachment", message_id))?;
        linked += result.rows_affected();
    }

    Ok(linked)
}

/// List a user's attachments, newest first; `images_only` keeps `image/*` types.
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: &str,
    images_only: bool,
    limit: i64,
    offset: i64,
) -> Result<Vec<MessageAttachment>> {
    let rows = sqlx::query_as::<_, MessageAttachment>(
        r#"
        SELECT id, message_id, user_id, file_name, file_type, file_size, url,
            storage_path, source, created_at
        FROM message_attachments
        WHERE user_id = ?
          AND (? = 0 OR file_type LIKE 'image/%')
        ORDER BY created_at DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id)
    .bind(images_only)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// List the attachments of a message.
pub async fn list_for_message(pool: &SqlitePool, message_id: &str) -> Result<Vec<MessageAttachment>> {
    let rows = sqlx::query_as::<_, MessageAttachment>(
        r#"
        SELECT id, message_id, user_id, file_name, file_type, file_size, url,
            storage_path, source, created_at
        FROM message_attachments
        WHERE message_id = ?
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(message_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Get an attachment owned by `user_id`.
pub async fn get_attachment(
    pool: &SqlitePool,
    user_id: &str,
    id: &str,
) -> Result<MessageAttachment> {
    sqlx::query_as::<_, MessageAttachment>(
        r#"
        SELECT id, message_id, user_id, file_name, file_type, file_size, url,
            storage_path, source, created_at
        FROM message_attachments
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DatabaseError::NotFound {
        entity: "Attachment",
        id: id.to_string(),
    })
}

/// Delete an attachment record owned by `user_id`.
pub async fn delete_attachment(pool: &SqlitePool, user_id: &str, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        DELETE FROM message_attachments
        WHERE id = ? AND user_id = ?
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Attachment",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Delete every attachment record of a user, returning the storage paths
/// that were associated with them.
pub async fn delete_all_for_user(pool: &SqlitePool, user_id: &str) -> Result<Vec<String>> {
    let paths = sqlx::query_scalar::<_, Option<String>>(
        r#"
        DELETE FROM message_attachments
        WHERE user_id = ?
        RETURNING storage_path
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(paths.into_iter().flatten().collect())
}
