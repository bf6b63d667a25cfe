//! User memory storage.
//!
//! Memories are never removed through the normal API: forgetting a memory
//! flips `is_active` off so the history stays auditable. Rows are only
//! deleted when the whole account goes away.

use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DatabaseError, Result};
use crate::models::{MemoryType, UserMemory};
use crate::validation;

/// List a user's active memories, oldest first.
pub async fn list_active(pool: &SqlitePool, user_id: &str) -> Result<Vec<UserMemory>> {
    let rows = sqlx::query_as::<_, UserMemory>(
        r#"
        SELECT id, user_id, key, value, memory_type, is_active, created_at, updated_at
        FROM user_memories
        WHERE user_id = ? AND is_active = 1
        ORDER BY created_at ASC, rowid ASC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Save a memory, replacing the value of an existing key.
///
/// A previously forgotten key becomes active again.
pub async fn upsert_memory(
    pool: &SqlitePool,
    user_id: &str,
    key: &str,
    value: &str,
    memory_type: MemoryType,
) -> Result<UserMemory> {
    validation::validate_memory(key, value)?;

    let id = Uuid::new_v4().to_string();
    let record = sqlx::query_as::<_, UserMemory>(
        r#"
        INSERT INTO user_memories (id, user_id, key, value, memory_type)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, key) DO UPDATE SET
            value = excluded.value,
            memory_type = excluded.memory_type,
            is_active = 1,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        RETURNING id, user_id, key, value, memory_type, is_active, created_at, updated_at
        "#,
    )
    .bind(&id)
    .bind(user_id)
    .bind(key.trim())
    .bind(value.trim())
    .bind(memory_type.as_str())
    .fetch_one(pool)
    .await?;

    tracing::debug!(user_id, key = %record.key, "Saved user memory");
    Ok(record)
}

/// Forget a single memory.
pub async fn deactivate_memory(pool: &SqlitePool, user_id: &str, id: &str) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE user_memories
        SET is_active = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE id = ? AND user_id = ? AND is_active = 1
        "#,
    )
    .bind(id)
    .bind(user_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DatabaseError::NotFound {
            entity: "Memory",
            id: id.to_string(),
        });
    }

    Ok(())
}

/// Forget every memory of a user. Returns the number of rows deactivated.
pub async fn deactivate_all(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE user_memories
        SET is_active = 0, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        WHERE user_id = ? AND is_active = 1
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Hard-delete every memory row of a user (account deletion).
pub async fn delete_all_for_user(pool: &SqlitePool, user_id: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_memories
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Count all memory rows of a user, active or not.
pub async fn count_all(pool: &SqlitePool, user_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM user_memories WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_upsert_replaces_value() {
        let db = test_db().await;

        let first = upsert_memory(db.pool(), "u", "pet", "a cat named Miso", MemoryType::Fact)
            .await
            .unwrap();
        let second = upsert_memory(db.pool(), "u", "pet", "two cats", MemoryType::Fact)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let active = list_active(db.pool(), "u").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].value, "two cats");
    }

    #[tokio::test]
    async fn test_deactivate_all_soft_deletes() {
        let db = test_db().await;
        upsert_memory(db.pool(), "u", "city", "Porto", MemoryType::Fact).await.unwrap();
        upsert_memory(db.pool(), "u", "tone", "casual", MemoryType::Preference)
            .await
            .unwrap();
        upsert_memory(db.pool(), "other", "city", "Oslo", MemoryType::Fact)
            .await
            .unwrap();

        assert_eq!(deactivate_all(db.pool(), "u").await.unwrap(), 2);
        assert!(list_active(db.pool(), "u").await.unwrap().is_empty());
        // Rows are kept.
        assert_eq!(count_all(db.pool(), "u").await.unwrap(), 2);
        assert_eq!(list_active(db.pool(), "other").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forgotten_key_reactivates() {
        let db = test_db().await;
        let saved = upsert_memory(db.pool(), "u", "city", "Porto", MemoryType::Fact)
            .await
            .unwrap();
        deactivate_memory(db.pool(), "u", &saved.id).await.unwrap();
        assert!(deactivate_memory(db.pool(), "u", &saved.id).await.unwrap_err().is_not_found());

        let again = upsert_memory(db.pool(), "u", "city", "Braga", MemoryType::Context)
            .await
            .unwrap();
        assert!(again.is_active);
        assert_eq!(again.memory_type, "context");
    }

    #[tokio::test]
    async fn test_delete_all_for_user() {
        let db = test_db().await;
        upsert_memory(db.pool(), "u", "a", "1", MemoryType::Fact).await.unwrap();
        assert_eq!(delete_all_for_user(db.pool(), "u").await.unwrap(), 1);
        assert_eq!(count_all(db.pool(), "u").await.unwrap(), 0);
    }
}
