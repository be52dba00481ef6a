use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};

use crate::error::ChatError;
use crate::types::{Message, ModelEntry};

/// Raw response body chunks in arrival order.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ChatError>> + Send>>;

#[async_trait]
pub trait CompletionTransport: Send + Sync {
    /// Dispatches the prompt and returns the response body once the status
    /// line has been accepted. Non-success statuses fail here.
    async fn send_request(&self, messages: &[Message], model: &str)
        -> Result<ByteStream, ChatError>;
}

#[async_trait]
pub trait ModelCatalogSource: Send + Sync {
    async fn list_models(&self) -> Result<Vec<ModelEntry>, ChatError>;
}

#[async_trait]
pub trait PersonaSource: Send + Sync {
    /// Fails when the document is unknown, unreachable or blank.
    async fn fetch_text(&self, document_id: &str) -> Result<String, ChatError>;
}

#[async_trait]
pub trait ImageDescriber: Send + Sync {
    /// Returns a plain-text description of the image at `image_url`.
    async fn describe_image(&self, image_url: &str) -> Result<String, ChatError>;
}

/// Drains a response body for callers that want the whole answer at once.
/// Bytes are decoded after the last chunk, so split characters survive.
pub async fn read_full_response(mut body: ByteStream) -> Result<String, ChatError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
