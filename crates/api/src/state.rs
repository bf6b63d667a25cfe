//! Application state shared across handlers.

use std::sync::Arc;

use chat_tools::{default_registry, ToolRegistry};
use database::{memory, preference, Conversation, Database, UserPreference};
use llm_client::{build_system_prompt, LlmClient, Persona};

use crate::auth::AuthProvider;
use crate::cache::TtlCache;
use crate::coalesce::Coalescer;
use crate::config::Config;
use crate::storage::ObjectStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Model API client.
    pub llm: Arc<LlmClient>,
    /// Tools offered to the model.
    pub tools: Arc<ToolRegistry>,
    /// Token verification and account management.
    pub auth: Arc<dyn AuthProvider>,
    /// Upload storage.
    pub store: Arc<dyn ObjectStore>,
    /// Per-user preferences (`None` when the user has none).
    preferences: Arc<TtlCache<String, Option<UserPreference>>>,
    /// Assembled system prompts per user and persona.
    prompts: Arc<TtlCache<(String, Persona), String>>,
    /// In-flight conversation creations keyed by user and draft title.
    pub conversations: Arc<Coalescer<String, Conversation>>,
}

impl AppState {
    /// Create new application state with the built-in tools.
    pub fn new(
        config: Config,
        db: Database,
        llm: LlmClient,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        let tools = default_registry(&config.tools, db.clone());
        Self::with_tools(config, db, llm, tools, auth, store)
    }

    /// Create new application state with a custom tool registry.
    pub fn with_tools(
        config: Config,
        db: Database,
        llm: LlmClient,
        tools: ToolRegistry,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            preferences: Arc::new(TtlCache::new(config.cache_ttl, config.cache_capacity)),
            prompts: Arc::new(TtlCache::new(config.cache_ttl, config.cache_capacity)),
            conversations: Arc::new(Coalescer::new(config.coalesce_window)),
            config: Arc::new(config),
            db,
            llm: Arc::new(llm),
            tools: Arc::new(tools),
            auth,
            store,
        }
    }

    /// A user's preferences, through the cache.
    pub async fn preferences(&self, user_id: &str) -> database::Result<Option<UserPreference>> {
        self.preferences
            .get_or_try_insert_with(user_id.to_string(), || {
                preference::get_preferences(self.db.pool(), user_id)
            })
            .await
    }

    /// The system prompt for a user (or an anonymous caller), through the cache.
    pub async fn system_prompt(
        &self,
        user_id: Option<&str>,
        persona: Persona,
    ) -> database::Result<String> {
        let Some(user_id) = user_id else {
            return Ok(build_system_prompt(persona, None, &[]));
        };

        self.prompts
            .get_or_try_insert_with((user_id.to_string(), persona), || async {
                let preferences = self.preferences(user_id).await?;
                let memories = memory::list_active(self.db.pool(), user_id).await?;
                tracing::debug!(user_id, memories = memories.len(), "Building system prompt");
                Ok::<_, database::DatabaseError>(build_system_prompt(
                    persona,
                    preferences.as_ref(),
                    &memories,
                ))
            })
            .await
    }

    /// Drop a user's cached preferences and prompts after their data changed.
    pub async fn invalidate_user(&self, user_id: &str) {
        self.preferences.invalidate(&user_id.to_string()).await;
        self.prompts.invalidate_where(|(user, _)| user == user_id).await;
        tracing::debug!(user_id, "Invalidated cached user context");
    }
}
