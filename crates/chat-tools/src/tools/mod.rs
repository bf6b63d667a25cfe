//! Built-in tool implementations.

mod image;
mod memory;
mod stock;
mod weather;

pub use image::{ImageCard, ImageGeneration, IMAGE_TOOL};
pub use memory::{MemoryCard, SaveMemory, SAVE_MEMORY_TOOL};
pub use stock::{StockCard, StockQuote};
pub use weather::{Weather, WeatherCard};

use serde::de::DeserializeOwned;

use crate::error::ToolError;

/// Send a request and decode a JSON body.
///
/// URLs are stripped from transport errors since they carry API keys.
pub(crate) async fn read_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    api: &str,
) -> Result<T, ToolError> {
    let response = request
        .send()
        .await
        .map_err(|e| ToolError::HttpError(e.without_url()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ToolError::Upstream(format!("{} returned status {}", api, status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| ToolError::HttpError(e.without_url()))?;
    Ok(serde_json::from_str(&body)?)
}
