//! User preference storage.

use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::models::{PreferenceUpdate, UserPreference};
use crate::validation;
use crate::Result;

/// Create or replace a user's preferences.
pub async fn upsert_preferences(
    pool: &SqlitePool,
    user_id: &str,
    update: &PreferenceUpdate,
) -> Result<UserPreference> {
    validation::validate_preferences(
        update.display_name.as_deref(),
        update.occupation.as_deref(),
        &update.traits,
        update.additional_context.as_deref(),
    )?;

    let traits: Vec<String> = update.traits.iter().map(|t| t.trim().to_string()).collect();

    let record = sqlx::query_as::<_, UserPreference>(
        r#"
        INSERT INTO user_preferences (user_id, display_name, occupation, traits, additional_context)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            display_name = excluded.display_name,
            occupation = excluded.occupation,
            traits = excluded.traits,
            additional_context = excluded.additional_context,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
        RETURNING user_id, display_name, occupation, traits, additional_context, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(non_blank(update.display_name.as_deref()))
    .bind(non_blank(update.occupation.as_deref()))
    .bind(Json(&traits))
    .bind(non_blank(update.additional_context.as_deref()))
    .fetch_one(pool)
    .await?;

    Ok(record)
}

/// Get a user's preferences, if any were saved.
pub async fn get_preferences(pool: &SqlitePool, user_id: &str) -> Result<Option<UserPreference>> {
    let record = sqlx::query_as::<_, UserPreference>(
        r#"
        SELECT user_id, display_name, occupation, traits, additional_context, created_at, updated_at
        FROM user_preferences
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Remove a user's preferences. Returns true if a row was deleted.
pub async fn delete_preferences(pool: &SqlitePool, user_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        DELETE FROM user_preferences
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DatabaseError};

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_get_preferences_not_found() {
        let db = test_db().await;
        assert!(get_preferences(db.pool(), "nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_replaces_fields() {
        let db = test_db().await;

        let first = PreferenceUpdate {
            display_name: Some("Sam".to_string()),
            occupation: Some("Nurse".to_string()),
            traits: vec!["warm".to_string(), " direct ".to_string()],
            additional_context: None,
        };
        let saved = upsert_preferences(db.pool(), "u", &first).await.unwrap();
        assert_eq!(saved.display_name.as_deref(), Some("Sam"));
        assert_eq!(saved.traits.0, vec!["warm", "direct"]);

        let second = PreferenceUpdate {
            display_name: Some("  ".to_string()),
            occupation: Some("Doctor".to_string()),
            traits: vec![],
            additional_context: Some("Works night shifts".to_string()),
        };
        upsert_preferences(db.pool(), "u", &second).await.unwrap();

        let fetched = get_preferences(db.pool(), "u").await.unwrap().unwrap();
        assert!(fetched.display_name.is_none());
        assert_eq!(fetched.occupation.as_deref(), Some("Doctor"));
        assert!(fetched.traits.0.is_empty());
        assert_eq!(fetched.additional_context.as_deref(), Some("Works night shifts"));
    }

    #[tokio::test]
    async fn test_upsert_validates() {
        let db = test_db().await;
        let update = PreferenceUpdate {
            display_name: Some("x".repeat(101)),
            ..Default::default()
        };
        let result = upsert_preferences(db.pool(), "u", &update).await;
        assert!(matches!(result, Err(DatabaseError::Validation(_))));
    }

    #[tokio::test]
    async fn test_delete_preferences() {
        let db = test_db().await;
        upsert_preferences(db.pool(), "u", &PreferenceUpdate::default())
            .await
            .unwrap();
        assert!(delete_preferences(db.pool(), "u").await.unwrap());
        assert!(!delete_preferences(db.pool(), "u").await.unwrap());
    }
}
