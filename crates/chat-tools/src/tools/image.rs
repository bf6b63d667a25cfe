//! Image generation tool for OpenAI-compatible `/images/generations` APIs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::read_json;
use crate::config::ToolsConfig;
use crate::error::ToolError;
use crate::tool::{Tool, ToolArgs, ToolOutput};

/// Name the image tool is registered under.
pub const IMAGE_TOOL: &str = "generate_image";

/// Card rendered for a generated image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCard {
    pub prompt: String,
    /// Remote URL or a `data:image/png;base64,...` URL.
    pub url: Option<String>,
    pub revised_prompt: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    url: Option<String>,
    b64_json: Option<String>,
    revised_prompt: Option<String>,
}

/// Generate an image from a text prompt.
pub struct ImageGeneration {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    size: String,
}

impl ImageGeneration {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.image_api_url.trim_end_matches('/').to_string(),
            api_key: config.image_api_key.clone(),
            model: config.image_model.clone(),
            size: config.image_size.clone(),
        }
    }

    async fn generate(&self, prompt: &str) -> Result<ImageCard, ToolError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ToolError::NotConfigured("Image generation"))?;

        debug!("Generating image with model {}", self.model);

        let response: GenerationResponse = read_json(
            self.client
                .post(format!("{}/images/generations", self.base_url))
                .bearer_auth(api_key)
                .json(&GenerationRequest {
                    model: &self.model,
                    prompt,
                    n: 1,
                    size: &self.size,
                }),
            "Image API",
        )
        .await?;

        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ToolError::Upstream("Image API returned no images".to_string()))?;

        let url = match (image.url, image.b64_json) {
            (Some(url), _) => url,
            (None, Some(b64)) => format!("data:image/png;base64,{}", b64),
            (None, None) => {
                return Err(ToolError::Upstream("Image API returned an empty image".to_string()))
            }
        };

        Ok(ImageCard {
            prompt: prompt.to_string(),
            url: Some(url),
            revised_prompt: image.revised_prompt,
            error: None,
        })
    }
}

#[async_trait]
impl Tool for ImageGeneration {
    fn name(&self) -> &str {
        IMAGE_TOOL
    }

    fn description(&self) -> &str {
        "Generate an image from a detailed text description."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "Detailed description of the image to generate"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, args: ToolArgs) -> ToolOutput {
        let prompt = match args.get_string("prompt") {
            Ok(prompt) => prompt,
            Err(e) => {
                return ToolOutput::failure(ImageCard {
                    prompt: String::new(),
                    url: None,
                    revised_prompt: None,
                    error: Some(e.to_string()),
                })
            }
        };

        match self.generate(&prompt).await {
            Ok(card) => ToolOutput::success(card),
            Err(e) => {
                warn!("Image generation failed: {}", e);
                ToolOutput::failure(ImageCard {
                    prompt,
                    url: None,
                    revised_prompt: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }
}
