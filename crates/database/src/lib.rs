//! SQLite persistence layer for the chat server.
//!
//! This crate provides async database operations for conversations, messages,
//! attachments, user preferences and user memories using SQLx with SQLite.
//!
//! # Example
//!
//! ```no_run
//! use database::{conversation, message, Database, MessageRole, NewMessage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect and run migrations
//!     let db = Database::connect("sqlite:chat.db?mode=rwc").await?;
//!     db.migrate().await?;
//!
//!     let conv = conversation::create_conversation(db.pool(), "user-1", "Hello").await?;
//!     message::insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::User, "Hi")).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod attachment;
pub mod conversation;
pub mod error;
pub mod memory;
pub mod message;
pub mod models;
pub mod preference;
pub mod validation;

pub use error::{DatabaseError, Result};
pub use models::{
    AttachmentSource, Conversation, MemoryType, Message, MessageAttachment, MessageRole,
    MessageStatus, NewAttachment, NewMessage, PreferenceUpdate, TokenUsage, UserMemory,
    UserPreference,
};
pub use validation::ValidationError;

/// JSON column wrapper used by `traits` and `metadata`.
pub use sqlx::types::Json;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Database connection wrapper.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Default pool size for database connections.
    /// Chat turns hold a connection while streaming, so keep headroom.
    const DEFAULT_POOL_SIZE: u32 = 20;

    /// Connect to a SQLite database.
    ///
    /// The URL should be in the format `sqlite:path/to/db.sqlite?mode=rwc`.
    ///
    /// ```no_run
    /// # async fn example() -> database::Result<()> {
    /// // File database
    /// let db = database::Database::connect("sqlite:data/chat.db?mode=rwc").await?;
    ///
    /// // In-memory database (for testing)
    /// let db = database::Database::connect("sqlite::memory:").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_pool_size(url, Self::DEFAULT_POOL_SIZE).await
    }

    /// Connect to a SQLite database with a custom pool size.
    pub async fn connect_with_pool_size(url: &str, pool_size: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(pool_size)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await?;

        tracing::info!("Connected to database: {} (pool size: {})", url, pool_size);

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        tracing::info!("Running database migrations...");

        sqlx::migrate!("./migrations").run(&self.pool).await?;

        tracing::info!("Migrations complete");
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        db.migrate().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_migrate_is_idempotent() {
        let db = test_db().await;
        db.migrate().await.unwrap();
        assert_eq!(conversation::count_for_user(db.pool(), "u").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_history_delete() {
        let db = test_db().await;

        let conv = conversation::create_conversation(db.pool(), "u", "Chat").await.unwrap();
        message::insert_message(db.pool(), &NewMessage::new(&conv.id, MessageRole::User, "hi"))
            .await
            .unwrap();
        memory::upsert_memory(db.pool(), "u", "name", "Ana", MemoryType::Fact)
            .await
            .unwrap();

        conversation::delete_all_for_user(db.pool(), "u").await.unwrap();
        memory::delete_all_for_user(db.pool(), "u").await.unwrap();

        assert_eq!(conversation::count_for_user(db.pool(), "u").await.unwrap(), 0);
        assert_eq!(message::count_for_conversation(db.pool(), &conv.id).await.unwrap(), 0);
        assert_eq!(memory::count_all(db.pool(), "u").await.unwrap(), 0);
    }
}
