//! Outbound prompt assembly.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;
use unichat_ai::{Message, PersonaSource};

pub const DEFAULT_MODEL: &str = "unity";
pub const DEFAULT_PERSONA_NAME: &str = "default";

pub const DEFAULT_INSTRUCTION: &str = "Wrap every piece of code in [CODE]...[/CODE] tags, \
for example [CODE]print(1)[/CODE].\n\n\
To show an image, write its URL on its own, for example \
https://image.pollinations.ai/prompt/a%20red%20fox?width=512&height=512&nologo=true&private=true&enhance=false \
followed by your answer.\n\n\
Answer naturally and directly.";

pub const DEFAULT_PERSONA: &str =
    "I am Unity, a candid assistant who speaks plainly and answers in my own voice.";

const FALLBACK_SYSTEM_SUFFIX: &str = "You are a helpful AI assistant.";

/// Prompt settings for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Base models take a system message instead of a persona.
    pub base_model: bool,
    pub system_message: Option<String>,
    pub use_persona: bool,
    pub default_persona: String,
    pub instruction: String,
    /// Persona name to document id.
    pub custom_personas: BTreeMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_model: false,
            system_message: None,
            use_persona: false,
            default_persona: DEFAULT_PERSONA.to_string(),
            instruction: DEFAULT_INSTRUCTION.to_string(),
            custom_personas: BTreeMap::new(),
        }
    }
}

impl ModelConfig {
    pub fn persona_document(&self, persona: &str) -> Option<&str> {
        self.custom_personas.get(persona).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCatalog {
    models: BTreeMap<String, ModelConfig>,
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModelCatalog {
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    /// Catalog with the persona-driven `unity` model.
    pub fn builtin() -> Self {
        let custom_personas = ["coder", "work", "college"]
            .into_iter()
            .map(|name| (name.to_string(), name.to_string()))
            .collect();
        let unity = ModelConfig {
            use_persona: true,
            custom_personas,
            ..ModelConfig::default()
        };
        let mut catalog = Self::empty();
        catalog.insert(DEFAULT_MODEL, unity);
        catalog
    }

    pub fn insert(&mut self, name: impl Into<String>, config: ModelConfig) {
        self.models.insert(name.into(), config);
    }

    /// Configured entries replace built-in ones of the same name.
    pub fn merge(&mut self, models: BTreeMap<String, ModelConfig>) {
        self.models.extend(models);
    }

    pub fn get(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

/// Folds a shared image into the user's text. The first `[Attached Image…]`
/// placeholder is dropped and `[Shared Image: …]` goes on its own paragraph.
pub fn with_shared_image(message: &str, image_summary: &str) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\[Attached Image.*?\]").expect("valid regex"));
    let mut composed = placeholder.replace(message, "").trim().to_string();
    if !composed.is_empty() {
        composed.push_str("\n\n");
    }
    composed.push_str(&format!("[Shared Image: {image_summary}]"));
    composed
}

/// Minimal prompt used when the model has no configuration.
pub fn fallback_messages(user_message: &str) -> Vec<Message> {
    vec![
        Message::system(format!("{DEFAULT_INSTRUCTION}\n\n{FALLBACK_SYSTEM_SUFFIX}")),
        Message::user(user_message),
    ]
}

/// Builds the ordered prompt: optional system entry, optional persona entry,
/// the history window, then the new user message.
pub async fn build_messages(
    catalog: &ModelCatalog,
    model_name: &str,
    user_message: &str,
    selected_persona: &str,
    history_window: &[Message],
    personas: &dyn PersonaSource,
) -> Vec<Message> {
    let Some(model) = catalog.get(model_name) else {
        warn!(model = model_name, "unknown model, using fallback prompt");
        return fallback_messages(user_message);
    };

    let mut messages = Vec::with_capacity(history_window.len() + 3);
    if model.base_model {
        if let Some(system_message) = &model.system_message {
            messages.push(Message::system(format!(
                "{system_message}\n\n{}",
                model.instruction
            )));
        }
    }

    if model.use_persona {
        let persona = resolve_persona_text(model, model_name, selected_persona, personas).await;
        messages.push(Message::assistant(format!(
            "{persona}\n\n{}",
            model.instruction
        )));
    }

    if !model.base_model && !model.use_persona {
        messages.push(Message::assistant(model.instruction.clone()));
    }

    messages.extend(
        history_window
            .iter()
            .filter(|message| message.role.is_conversational())
            .cloned(),
    );
    messages.push(Message::user(user_message));
    messages
}

async fn resolve_persona_text(
    model: &ModelConfig,
    model_name: &str,
    selected_persona: &str,
    personas: &dyn PersonaSource,
) -> String {
    if selected_persona == DEFAULT_PERSONA_NAME {
        return model.default_persona.clone();
    }
    let Some(document_id) = model.persona_document(selected_persona) else {
        return model.default_persona.clone();
    };
    match personas.fetch_text(document_id).await {
        Ok(text) => text,
        Err(error) => {
            warn!(
                model = model_name,
                persona = selected_persona,
                %error,
                "persona fetch failed, using default persona"
            );
            model.default_persona.clone()
        }
    }
}
