//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chat_tools::ToolsConfig;
use llm_client::{LlmConfig, LlmError};

/// Chat server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Directory uploaded files are written to.
    pub storage_dir: PathBuf,
    /// Base URL clients reach this server at; stored file URLs start with it.
    pub public_url: String,
    /// Auth provider base URL (GoTrue-style).
    pub auth_url: Option<String>,
    /// Auth provider API key.
    pub auth_api_key: Option<String>,
    /// Lifetime of cached preferences and system prompts.
    pub cache_ttl: Duration,
    /// Max users held in each cache.
    pub cache_capacity: usize,
    /// How long a created conversation answers duplicate create requests.
    pub coalesce_window: Duration,
    /// Ask the model for a title after a new conversation's first turn.
    pub generate_titles: bool,
    /// Model API settings.
    pub llm: LlmConfig,
    /// Tool API settings.
    pub tools: ToolsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            database_url: "sqlite:chat.db?mode=rwc".to_string(),
            storage_dir: PathBuf::from("uploads"),
            public_url: "http://127.0.0.1:8787".to_string(),
            auth_url: None,
            auth_api_key: None,
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1000,
            coalesce_window: Duration::from_secs(30),
            generate_titles: true,
            llm: LlmConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `API_ADDR` | Server bind address | `127.0.0.1:8787` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:chat.db?mode=rwc` |
    /// | `STORAGE_DIR` | Upload directory | `uploads` |
    /// | `PUBLIC_URL` | Public base URL | `http://127.0.0.1:8787` |
    /// | `AUTH_URL` | Auth provider URL | (none, all requests anonymous) |
    /// | `AUTH_API_KEY` | Auth provider key | (none) |
    /// | `CACHE_TTL_SECS` | Preference/prompt cache TTL | `300` |
    /// | `CACHE_CAPACITY` | Users per cache | `1000` |
    /// | `COALESCE_WINDOW_SECS` | Duplicate-create window | `30` |
    /// | `GENERATE_TITLES` | Model-written titles | `true` |
    ///
    /// Model settings come from [`LlmConfig::from_env`] and tool settings
    /// from [`ToolsConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let addr = match env::var("API_ADDR") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidAddr)?,
            Err(_) => defaults.addr,
        };

        let database_url = env::var("SQLITE_PATH").unwrap_or(defaults.database_url);
        let storage_dir = env::var("STORAGE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_dir);
        let public_url = env::var("PUBLIC_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.public_url);

        let auth_url = non_empty_var("AUTH_URL");
        let auth_api_key = non_empty_var("AUTH_API_KEY");

        let cache_ttl = Duration::from_secs(parse_var("CACHE_TTL_SECS", 300)?);
        let cache_capacity = parse_var("CACHE_CAPACITY", 1000)?;
        let coalesce_window = Duration::from_secs(parse_var("COALESCE_WINDOW_SECS", 30)?);
        let generate_titles = parse_var("GENERATE_TITLES", true)?;

        Ok(Self {
            addr,
            database_url,
            storage_dir,
            public_url,
            auth_url,
            auth_api_key,
            cache_ttl,
            cache_capacity,
            coalesce_window,
            generate_titles,
            llm: LlmConfig::from_env()?,
            tools: ToolsConfig::from_env(),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API_ADDR format")]
    InvalidAddr,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),

    #[error(transparent)]
    Llm(#[from] LlmError),
}
