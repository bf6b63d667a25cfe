//! Weather tool using the AccuWeather API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::read_json;
use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::tool::{Tool, ToolArgs, ToolOutput};

/// Card rendered for a weather lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherCard {
    pub location: String,
    /// Degrees Celsius.
    pub temperature: f64,
    pub condition: String,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Wind speed in km/h.
    pub wind_speed: f64,
    pub icon: Option<u32>,
    pub is_day: bool,
    pub error: Option<String>,
}

impl WeatherCard {
    fn fallback(location: &str, error: impl Into<String>) -> Self {
        Self {
            location: location.to_string(),
            temperature: 0.0,
            condition: "Unknown".to_string(),
            humidity: 0.0,
            wind_speed: 0.0,
            icon: None,
            is_day: true,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct City {
    key: String,
    localized_name: String,
    country: Option<Named>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Named {
    localized_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Conditions {
    weather_text: String,
    weather_icon: Option<u32>,
    #[serde(default = "default_true")]
    is_day_time: bool,
    temperature: Measure,
    relative_humidity: Option<f64>,
    wind: Option<Wind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Wind {
    speed: Measure,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Measure {
    metric: Unit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Unit {
    value: f64,
}

fn default_true() -> bool {
    true
}

/// Current weather for a city.
///
/// Two requests: a city search to resolve a location key, then the current
/// conditions for that key. Each request is bounded by the configured
/// timeout.
///
/// # Parameters
///
/// - `location` (required): City name, optionally with region or country.
///
/// ```json
/// {"location": "Lisbon"}
/// ```
pub struct Weather {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl Weather {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.accuweather_url.trim_end_matches('/').to_string(),
            api_key: config.accuweather_api_key.clone(),
            timeout: config.weather_timeout,
        }
    }

    async fn fetch_weather(&self, location: &str) -> Result<WeatherCard, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ToolError::NotConfigured("Weather service"))?;

        let search_url = format!("{}/locations/v1/cities/search", self.base_url);
        debug!("Searching AccuWeather for '{}'", location);

        let cities: Vec<City> = read_json(
            self.client
                .get(&search_url)
                .query(&[("apikey", api_key), ("q", location)])
                .timeout(self.timeout),
            "Weather location search",
        )
        .await?;

        let city = cities
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::ExecutionFailed(format!("Location not found: {}", location)))?;

        let conditions_url = format!("{}/currentconditions/v1/{}", self.base_url, city.key);
        let conditions: Vec<Conditions> = read_json(
            self.client
                .get(&conditions_url)
                .query(&[("apikey", api_key), ("details", "true")])
                .timeout(self.timeout),
            "Weather conditions",
        )
        .await?;

        let current = conditions.into_iter().next().ok_or_else(|| {
            ToolError::ExecutionFailed(format!("No current conditions for {}", city.localized_name))
        })?;

        let display = match city.country {
            Some(country) => format!("{}, {}", city.localized_name, country.localized_name),
            None => city.localized_name,
        };

        Ok(WeatherCard {
            location: display,
            temperature: current.temperature.metric.value,
            condition: current.weather_text,
            humidity: current.relative_humidity.unwrap_or(0.0),
            wind_speed: current.wind.map(|w| w.speed.metric.value).unwrap_or(0.0),
            icon: current.weather_icon,
            is_day: current.is_day_time,
            error: None,
        })
    }
}

#[async_trait]
impl Tool for Weather {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather for a city. Returns temperature in Celsius, \
         conditions, humidity and wind speed."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City name, e.g. \"Lisbon\" or \"Austin, TX\""
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> ToolOutput {
        let location = match args.get_string("location") {
            Ok(location) => location,
            Err(e) => return ToolOutput::failure(WeatherCard::fallback("", e.to_string())),
        };

        match self.fetch_weather(&location).await {
            Ok(card) => ToolOutput::success(card),
            Err(e) => {
                warn!("Weather fetch failed for '{}': {}", location, e);
                ToolOutput::failure(WeatherCard::fallback(&location, e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::collections::HashMap;

    fn make_args(location: &str) -> ToolArgs {
        let mut params = HashMap::new();
        params.insert("location".to_string(), Value::String(location.to_string()));
        ToolArgs::new(params)
    }

    fn tool_for(server: &mockito::ServerGuard) -> Weather {
        Weather::new(
            &ToolsConfig::builder()
                .accuweather(server.url(), "test-key")
                .build(),
        )
    }

    #[tokio::test]
    async fn test_current_conditions() {
        let mut server = mockito::Server::new_async().await;
        let search = server
            .mock("GET", "/locations/v1/cities/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("apikey".into(), "test-key".into()),
                Matcher::UrlEncoded("q".into(), "London".into()),
            ]))
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{"Key":"328328","LocalizedName":"London","Country":{"LocalizedName":"United Kingdom"}}]"#,
            )
            .create_async()
            .await;
        let current = server
            .mock("GET", "/currentconditions/v1/328328")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[{
                    "WeatherText": "Light rain",
                    "WeatherIcon": 12,
                    "IsDayTime": false,
                    "Temperature": {"Metric": {"Value": 11.2, "Unit": "C"}},
                    "RelativeHumidity": 87,
                    "Wind": {"Speed": {"Metric": {"Value": 14.8, "Unit": "km/h"}}}
                }]"#,
            )
            .create_async()
            .await;

        let output = tool_for(&server).execute(make_args("London")).await;
        search.assert_async().await;
        current.assert_async().await;

        assert!(output.success);
        let card: WeatherCard = serde_json::from_value(output.card).unwrap();
        assert_eq!(card.location, "London, United Kingdom");
        assert_eq!(card.temperature, 11.2);
        assert_eq!(card.condition, "Light rain");
        assert_eq!(card.humidity, 87.0);
        assert_eq!(card.wind_speed, 14.8);
        assert_eq!(card.icon, Some(12));
        assert!(!card.is_day);
        assert!(card.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_location_returns_fallback_card() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/locations/v1/cities/search")
            .match_query(Matcher::Any)
            .with_header("content-type", "application/json")
            .with_body("[]")
            .create_async()
            .await;

        let output = tool_for(&server).execute(make_args("Atlantis")).await;

        assert!(!output.success);
        assert_eq!(output.error(), Some("Location not found: Atlantis"));
        assert_eq!(output.card["temperature"].as_f64(), Some(0.0));
        assert_eq!(output.card["condition"], "Unknown");
        assert_eq!(output.card["location"], "Atlantis");
    }

    #[tokio::test]
    async fn test_upstream_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/locations/v1/cities/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let output = tool_for(&server).execute(make_args("Paris")).await;
        assert!(!output.success);
        assert!(output.error().unwrap().contains("503"));
        // The API key never leaks into the card.
        assert!(!output.content().contains("test-key"));
    }

    #[tokio::test]
    async fn test_missing_location() {
        let tool = Weather::new(&ToolsConfig::default());
        let output = tool.execute(ToolArgs::new(HashMap::new())).await;

        assert!(!output.success);
        assert_eq!(output.error(), Some("Missing required parameter: location"));
        assert_eq!(output.card["temperature"].as_f64(), Some(0.0));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let tool = Weather::new(&ToolsConfig::default());
        let output = tool.execute(make_args("Oslo")).await;
        assert_eq!(output.error(), Some("Weather service is not configured"));
    }
}
