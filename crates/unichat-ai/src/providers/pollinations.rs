use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Url;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use super::common::{clock_seed, shared_http_client, SEED_RANGE};
use crate::error::{ChatError, ChatErrorCode};
use crate::transport::{
    read_full_response, ByteStream, CompletionTransport, ImageDescriber, ModelCatalogSource,
};
use crate::types::{CompletionRequest, Message, ModelEntry};

pub const DEFAULT_TEXT_ENDPOINT: &str = "https://text.pollinations.ai/";
pub const DEFAULT_MODELS_ENDPOINT: &str = "https://text.pollinations.ai/models";
pub const DEFAULT_IMAGE_ENDPOINT: &str = "https://image.pollinations.ai/prompt/";

/// Answers in one piece; used for descriptions and prompt rewriting.
const UTILITY_MODEL: &str = "openai";
const SEARCH_MODEL: &str = "searchgpt";
const IMAGE_DESCRIPTION_PROMPT: &str = "Describe the image exactly as you see it.";
const ENHANCE_SYSTEM_PROMPT: &str = "You rewrite prompts for language models. Turn the user's \
prompt into a clearer, more detailed and more effective one. Keep it concise and reply with the \
rewritten prompt only.";
const IMAGE_WIDTH: u32 = 1920;
const IMAGE_HEIGHT: u32 = 1080;

#[derive(Debug, Clone, PartialEq)]
pub struct PollinationsConfig {
    pub text_endpoint: String,
    pub models_endpoint: String,
    /// Base URL of the image-generation service; the prompt is appended as
    /// the last path segment.
    pub image_endpoint: String,
    /// Models that answer in one piece; `stream` and `seed` are not sent.
    pub non_streaming_models: Vec<String>,
    /// Fixed seed for reproducible output. Derived from the clock when unset.
    pub seed: Option<u64>,
}

impl Default for PollinationsConfig {
    fn default() -> Self {
        Self {
            text_endpoint: DEFAULT_TEXT_ENDPOINT.to_string(),
            models_endpoint: DEFAULT_MODELS_ENDPOINT.to_string(),
            image_endpoint: DEFAULT_IMAGE_ENDPOINT.to_string(),
            non_streaming_models: vec!["openai".to_string()],
            seed: None,
        }
    }
}

/// HTTP client for the text-generation service and its model catalog.
#[derive(Debug, Clone, Default)]
pub struct PollinationsClient {
    config: PollinationsConfig,
}

impl PollinationsClient {
    pub fn new(config: PollinationsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollinationsConfig {
        &self.config
    }

    pub fn build_request(&self, messages: &[Message], model: &str) -> CompletionRequest {
        let streaming = !self
            .config
            .non_streaming_models
            .iter()
            .any(|name| name == model);
        CompletionRequest {
            messages: messages.to_vec(),
            model: model.to_string(),
            stream: streaming.then_some(true),
            seed: streaming.then(|| {
                self.config
                    .seed
                    .map(|seed| seed % SEED_RANGE)
                    .unwrap_or_else(clock_seed)
            }),
        }
    }

    /// Link to a generated image for `prompt`. Nothing is requested; the
    /// service renders the image when the link is opened.
    pub fn image_url(&self, prompt: &str) -> Result<String, ChatError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(ChatError::new(
                ChatErrorCode::Configuration,
                "Image prompt is empty",
            ));
        }
        let mut url = Url::parse(&self.config.image_endpoint).map_err(|error| {
            ChatError::new(
                ChatErrorCode::Configuration,
                format!("Invalid image endpoint {}: {error}", self.config.image_endpoint),
            )
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ChatError::new(
                    ChatErrorCode::Configuration,
                    format!("Image endpoint cannot take a path: {}", self.config.image_endpoint),
                )
            })?
            .pop_if_empty()
            .push(prompt);
        let seed = self
            .config
            .seed
            .map(|seed| seed % SEED_RANGE)
            .unwrap_or_else(clock_seed);
        url.query_pairs_mut()
            .append_pair("nologo", "true")
            .append_pair("private", "true")
            .append_pair("width", &IMAGE_WIDTH.to_string())
            .append_pair("height", &IMAGE_HEIGHT.to_string())
            .append_pair("enhance", "false")
            .append_pair("seed", &seed.to_string());
        Ok(url.into())
    }

    /// Rewrites `prompt` into a more detailed one.
    pub async fn enhance_prompt(&self, prompt: &str) -> Result<String, ChatError> {
        let messages = [
            Message::system(ENHANCE_SYSTEM_PROMPT),
            Message::user(prompt),
        ];
        let body = self.send_request(&messages, UTILITY_MODEL).await?;
        let enhanced = read_full_response(body).await?;
        Ok(enhanced.trim().to_string())
    }

    /// Asks the search-backed model a single question.
    pub async fn search(&self, query: &str) -> Result<String, ChatError> {
        let body = self
            .send_request(&[Message::user(query)], SEARCH_MODEL)
            .await?;
        read_full_response(body).await
    }

    async fn post_json<T>(&self, body: &T) -> Result<reqwest::Response, ChatError>
    where
        T: Serialize + Sync,
    {
        let endpoint = self.config.text_endpoint.as_str();
        let response = shared_http_client(endpoint)
            .post(endpoint)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|error| {
                ChatError::new(
                    ChatErrorCode::Transport,
                    format!("Text request failed: {error}"),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(ChatError::new(
                ChatErrorCode::Http,
                format!("Text request failed with status {status}"),
            )
            .with_details(json!({ "status": status, "body": body })));
        }
        Ok(response)
    }
}

fn body_stream(response: reqwest::Response) -> ByteStream {
    let stream = response.bytes_stream().map(|chunk| {
        chunk.map(|bytes| bytes.to_vec()).map_err(|error| {
            ChatError::new(
                ChatErrorCode::Transport,
                format!("Response body read failed: {error}"),
            )
        })
    });
    Box::pin(stream)
}

#[async_trait]
impl CompletionTransport for PollinationsClient {
    async fn send_request(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<ByteStream, ChatError> {
        let body = self.build_request(messages, model);
        info!(
            model,
            messages = body.messages.len(),
            stream = body.stream.unwrap_or(false),
            "dispatching completion request"
        );
        let response = self.post_json(&body).await?;
        Ok(body_stream(response))
    }
}

#[async_trait]
impl ImageDescriber for PollinationsClient {
    async fn describe_image(&self, image_url: &str) -> Result<String, ChatError> {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": IMAGE_DESCRIPTION_PROMPT },
                    { "type": "image_url", "image_url": { "url": image_url } },
                ],
            }],
            "model": UTILITY_MODEL,
            "jsonMode": false,
        });
        debug!(image_url, "requesting image description");
        let response = self.post_json(&body).await?;
        let description = read_full_response(body_stream(response)).await?;
        let description = description.trim();
        if description.is_empty() {
            return Err(ChatError::new(
                ChatErrorCode::Protocol,
                "Image description was empty",
            ));
        }
        Ok(description.to_string())
    }
}

#[async_trait]
impl ModelCatalogSource for PollinationsClient {
    async fn list_models(&self) -> Result<Vec<ModelEntry>, ChatError> {
        let endpoint = self.config.models_endpoint.as_str();
        let response = shared_http_client(endpoint)
            .get(endpoint)
            .send()
            .await
            .map_err(|error| {
                ChatError::new(
                    ChatErrorCode::Transport,
                    format!("Model catalog request failed: {error}"),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ChatError::new(
                ChatErrorCode::Http,
                format!("Failed to fetch models: HTTP {status}"),
            )
            .with_details(json!({ "status": status })));
        }

        let body = response.text().await.map_err(|error| {
            ChatError::new(
                ChatErrorCode::Transport,
                format!("Model catalog read failed: {error}"),
            )
        })?;
        let models: Vec<ModelEntry> = serde_json::from_str(&body).map_err(|error| {
            ChatError::new(
                ChatErrorCode::Protocol,
                format!("Invalid model catalog JSON: {error}"),
            )
        })?;
        debug!(count = models.len(), "model catalog loaded");
        Ok(models)
    }
}
