use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{ChatError, ChatErrorCode};
use crate::transport::PersonaSource;

/// Persona documents held in memory, keyed by document id.
#[derive(Debug, Clone, Default)]
pub struct StaticPersonaSource {
    documents: HashMap<String, String>,
}

impl StaticPersonaSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(document_id, text);
        self
    }

    pub fn insert(&mut self, document_id: impl Into<String>, text: impl Into<String>) {
        self.documents.insert(document_id.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl PersonaSource for StaticPersonaSource {
    async fn fetch_text(&self, document_id: &str) -> Result<String, ChatError> {
        match self.documents.get(document_id) {
            Some(text) if !text.trim().is_empty() => Ok(text.clone()),
            Some(_) => Err(ChatError::new(
                ChatErrorCode::PersonaUnavailable,
                "Empty persona received",
            )
            .with_details(json!({ "document": document_id }))),
            None => Err(ChatError::new(
                ChatErrorCode::PersonaUnavailable,
                format!("Unknown persona document: {document_id}"),
            )
            .with_details(json!({ "document": document_id }))),
        }
    }
}
