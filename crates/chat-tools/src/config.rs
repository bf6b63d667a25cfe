//! Configuration for the built-in tools.

use std::env;
use std::time::Duration;

/// Default AccuWeather API base URL.
pub const DEFAULT_ACCUWEATHER_URL: &str = "https://dataservice.accuweather.com";

/// Default Alpha Vantage API base URL.
pub const DEFAULT_ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co";

/// Default image generation API base URL.
pub const DEFAULT_IMAGE_API_URL: &str = "https://api.openai.com/v1";

/// Configuration for the built-in tools.
///
/// Missing API keys do not prevent startup; the affected tool answers
/// with an error card instead.
#[derive(Debug, Clone)]
pub struct ToolsConfig {
    pub accuweather_url: String,
    pub accuweather_api_key: Option<String>,

    /// Timeout applied to each of the two weather requests.
    pub weather_timeout: Duration,

    pub alpha_vantage_url: String,
    pub alpha_vantage_api_key: Option<String>,

    pub image_api_url: String,
    pub image_api_key: Option<String>,
    pub image_model: String,
    pub image_size: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            accuweather_url: DEFAULT_ACCUWEATHER_URL.to_string(),
            accuweather_api_key: None,
            weather_timeout: Duration::from_secs(5),
            alpha_vantage_url: DEFAULT_ALPHA_VANTAGE_URL.to_string(),
            alpha_vantage_api_key: None,
            image_api_url: DEFAULT_IMAGE_API_URL.to_string(),
            image_api_key: None,
            image_model: "dall-e-3".to_string(),
            image_size: "1024x1024".to_string(),
        }
    }
}

impl ToolsConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `ACCUWEATHER_API_KEY` / `ACCUWEATHER_API_URL`
    /// - `WEATHER_TIMEOUT_MS` - per-request weather timeout (default: 5000)
    /// - `ALPHA_VANTAGE_API_KEY` / `ALPHA_VANTAGE_API_URL`
    /// - `IMAGE_API_KEY` / `IMAGE_API_URL` / `IMAGE_MODEL` / `IMAGE_SIZE`
    ///
    /// `IMAGE_API_KEY` falls back to `LLM_API_KEY` when unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            accuweather_url: env::var("ACCUWEATHER_API_URL").unwrap_or(defaults.accuweather_url),
            accuweather_api_key: non_empty_var("ACCUWEATHER_API_KEY"),
            weather_timeout: env::var("WEATHER_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.weather_timeout),
            alpha_vantage_url: env::var("ALPHA_VANTAGE_API_URL")
                .unwrap_or(defaults.alpha_vantage_url),
            alpha_vantage_api_key: non_empty_var("ALPHA_VANTAGE_API_KEY"),
            image_api_url: env::var("IMAGE_API_URL").unwrap_or(defaults.image_api_url),
            image_api_key: non_empty_var("IMAGE_API_KEY").or_else(|| non_empty_var("LLM_API_KEY")),
            image_model: env::var("IMAGE_MODEL").unwrap_or(defaults.image_model),
            image_size: env::var("IMAGE_SIZE").unwrap_or(defaults.image_size),
        }
    }

    /// Create a new config builder.
    pub fn builder() -> ToolsConfigBuilder {
        ToolsConfigBuilder::default()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for ToolsConfig.
#[derive(Debug, Default)]
pub struct ToolsConfigBuilder {
    config: ToolsConfig,
}

impl ToolsConfigBuilder {
    pub fn accuweather(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.accuweather_url = url.into();
        self.config.accuweather_api_key = Some(api_key.into());
        self
    }

    pub fn weather_timeout(mut self, timeout: Duration) -> Self {
        self.config.weather_timeout = timeout;
        self
    }

    pub fn alpha_vantage(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.alpha_vantage_url = url.into();
        self.config.alpha_vantage_api_key = Some(api_key.into());
        self
    }

    pub fn image_api(mut self, url: impl Into<String>, api_key: impl Into<String>) -> Self {
        self.config.image_api_url = url.into();
        self.config.image_api_key = Some(api_key.into());
        self
    }

    pub fn image_model(mut self, model: impl Into<String>) -> Self {
        self.config.image_model = model.into();
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ToolsConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ToolsConfig::default();
        assert_eq!(config.accuweather_url, DEFAULT_ACCUWEATHER_URL);
        assert!(config.accuweather_api_key.is_none());
        assert_eq!(config.weather_timeout, Duration::from_secs(5));
        assert_eq!(config.image_model, "dall-e-3");
    }

    #[test]
    fn test_builder() {
        let config = ToolsConfig::builder()
            .accuweather("http://localhost:1234", "weather-key")
            .alpha_vantage("http://localhost:5678", "stock-key")
            .weather_timeout(Duration::from_millis(250))
            .build();

        assert_eq!(config.accuweather_url, "http://localhost:1234");
        assert_eq!(config.accuweather_api_key.as_deref(), Some("weather-key"));
        assert_eq!(config.alpha_vantage_api_key.as_deref(), Some("stock-key"));
        assert_eq!(config.weather_timeout, Duration::from_millis(250));
        assert!(config.image_api_key.is_none());
    }
}
