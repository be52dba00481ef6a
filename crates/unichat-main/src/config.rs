use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use unichat_ai::{
    PollinationsConfig, StaticPersonaSource, DEFAULT_IMAGE_ENDPOINT, DEFAULT_MODELS_ENDPOINT,
    DEFAULT_TEXT_ENDPOINT,
};
use unichat_core::{
    ChatSessionConfig, ModelCatalog, ModelConfig, ScannerOptions, DEFAULT_CODE_LANGUAGE,
    DEFAULT_HISTORY_WINDOW, DEFAULT_MODEL,
};

use crate::unichat_home::{resolve_config_path, CONFIG_FILE_NAME};

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FILE: &str = "unichat.log";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnichatToml {
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub chat: ChatSection,
    #[serde(default)]
    pub log: LogSection,
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    /// Persona document id to text file.
    #[serde(default)]
    pub documents: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSection {
    #[serde(default)]
    pub text_endpoint: Option<String>,
    #[serde(default)]
    pub models_endpoint: Option<String>,
    #[serde(default)]
    pub image_endpoint: Option<String>,
    #[serde(default)]
    pub non_streaming_models: Option<Vec<String>>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatSection {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub history_window: Option<usize>,
    #[serde(default)]
    pub default_language: Option<String>,
    #[serde(default)]
    pub speech_command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogSection {
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub stdout: Option<bool>,
}

impl LogSection {
    pub fn level(&self) -> String {
        non_empty(self.level.as_deref()).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
    }

    pub fn file(&self) -> String {
        non_empty(self.file.as_deref()).unwrap_or_else(|| DEFAULT_LOG_FILE.to_string())
    }

    pub fn stdout(&self) -> bool {
        self.stdout.unwrap_or(false)
    }
}

impl UnichatToml {
    /// Reads `unichat.toml` from `home`. A missing file yields defaults.
    pub fn load(home: &Path) -> Result<Self, String> {
        let path = home.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|error| format!("read {} failed: {error}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|error| format!("parse unichat.toml failed: {error}"))
    }

    pub fn pollinations_config(&self) -> PollinationsConfig {
        let defaults = PollinationsConfig::default();
        PollinationsConfig {
            text_endpoint: non_empty(self.api.text_endpoint.as_deref())
                .unwrap_or_else(|| DEFAULT_TEXT_ENDPOINT.to_string()),
            models_endpoint: non_empty(self.api.models_endpoint.as_deref())
                .unwrap_or_else(|| DEFAULT_MODELS_ENDPOINT.to_string()),
            image_endpoint: self.image_endpoint(),
            non_streaming_models: self
                .api
                .non_streaming_models
                .clone()
                .unwrap_or(defaults.non_streaming_models),
            seed: self.api.seed,
        }
    }

    fn image_endpoint(&self) -> String {
        non_empty(self.api.image_endpoint.as_deref())
            .unwrap_or_else(|| DEFAULT_IMAGE_ENDPOINT.to_string())
    }

    /// `model_override` comes from the command line and wins over the file.
    pub fn session_config(&self, model_override: Option<&str>) -> ChatSessionConfig {
        let model = non_empty(model_override)
            .or_else(|| non_empty(self.chat.model.as_deref()))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let mut catalog = ModelCatalog::builtin();
        catalog.merge(self.models.clone());
        let mut scanner = ScannerOptions {
            default_language: non_empty(self.chat.default_language.as_deref())
                .unwrap_or_else(|| DEFAULT_CODE_LANGUAGE.to_string()),
            ..ScannerOptions::default()
        };
        // Links built from a custom image endpoint must still render as images.
        let image_endpoint = self.image_endpoint();
        if !scanner.image_hosts.contains(&image_endpoint) {
            scanner.image_hosts.push(image_endpoint);
        }
        ChatSessionConfig {
            model,
            catalog,
            history_window: self.chat.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
            scanner,
        }
    }

    /// Loads every `[documents]` file into memory.
    pub fn persona_source(&self, home: &Path) -> Result<StaticPersonaSource, String> {
        let mut source = StaticPersonaSource::new();
        for (document_id, file) in &self.documents {
            let path = resolve_config_path(home, file);
            let text = fs::read_to_string(&path).map_err(|error| {
                format!("read persona document {document_id} from {} failed: {error}", path.display())
            })?;
            source.insert(document_id.clone(), text);
        }
        Ok(source)
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
