//! Stock quote tool using the Alpha Vantage `GLOBAL_QUOTE` endpoint.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::read_json;
use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::tool::{Tool, ToolArgs, ToolOutput};

/// Card rendered for a stock quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockCard {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    /// Percent change, e.g. `1.23` for +1.23%.
    pub change_percent: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: u64,
    pub previous_close: f64,
    pub latest_trading_day: Option<String>,
    pub error: Option<String>,
}

impl StockCard {
    fn fallback(symbol: &str, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            price: 0.0,
            change: 0.0,
            change_percent: 0.0,
            open: 0.0,
            high: 0.0,
            low: 0.0,
            volume: 0,
            previous_close: 0.0,
            latest_trading_day: None,
            error: Some(error.into()),
        }
    }

    /// Build a card from the "Global Quote" object, whose keys look like
    /// `"05. price"`.
    fn from_quote(symbol: &str, quote: &HashMap<String, String>) -> Self {
        let field = |suffix: &str| -> Option<&str> {
            quote
                .iter()
                .find(|(k, _)| k.split_once(". ").map(|(_, name)| name) == Some(suffix))
                .map(|(_, v)| v.as_str())
        };
        let number = |suffix: &str| -> f64 {
            field(suffix)
                .map(|v| v.trim_end_matches('%'))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0)
        };

        Self {
            symbol: field("symbol").unwrap_or(symbol).to_string(),
            price: number("price"),
            change: number("change"),
            change_percent: number("change percent"),
            open: number("open"),
            high: number("high"),
            low: number("low"),
            volume: field("volume").and_then(|v| v.parse().ok()).unwrap_or(0),
            previous_close: number("previous close"),
            latest_trading_day: field("latest trading day").map(str::to_string),
            error: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

/// Latest stock price for a ticker symbol.
///
/// # Parameters
///
/// - `symbol` (required): Ticker symbol, e.g. "AAPL".
pub struct StockQuote {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl StockQuote {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.alpha_vantage_url.trim_end_matches('/').to_string(),
            api_key: config.alpha_vantage_api_key.clone(),
        }
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<StockCard, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ToolError::NotConfigured("Stock quote service"))?;

        debug!("Fetching quote for {}", symbol);

        let response: QuoteResponse = read_json(
            self.client.get(format!("{}/query", self.base_url)).query(&[
                ("function", "GLOBAL_QUOTE"),
                ("symbol", symbol),
                ("apikey", api_key),
            ]),
            "Stock quote API",
        )
        .await?;

        // Rate limiting and bad keys come back as 200 with a message.
        if let Some(message) = response
            .note
            .or(response.information)
            .or(response.error_message)
        {
            return Err(ToolError::Upstream(message));
        }

        match response.global_quote {
            Some(quote) if !quote.is_empty() => Ok(StockCard::from_quote(symbol, &quote)),
            _ => Err(ToolError::ExecutionFailed(format!("No quote found for symbol {}", symbol))),
        }
    }
}

#[async_trait]
impl Tool for StockQuote {
    fn name(&self) -> &str {
        "get_stock_quote"
    }

    fn description(&self) -> &str {
        "Get the latest stock price, daily change and trading range for a ticker symbol."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "Stock ticker symbol, e.g. \"AAPL\" or \"MSFT\""
                }
            },
            "required": ["symbol"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> ToolOutput {
        let symbol = match args.get_string("symbol") {
            Ok(symbol) => symbol.to_uppercase(),
            Err(e) => return ToolOutput::failure(StockCard::fallback("", e.to_string())),
        };

        match self.fetch_quote(&symbol).await {
            Ok(card) => ToolOutput::success(card),
            Err(e) => {
                warn!("Stock quote failed for {}: {}", symbol, e);
                ToolOutput::failure(StockCard::fallback(&symbol, e.to_string()))
            }
        }
    }
}
