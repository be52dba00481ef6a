use std::fmt::{Display, Formatter};
use std::str::FromStr;

use tracing::warn;

use crate::prompt::{DEFAULT_PERSONA, DEFAULT_PERSONA_NAME};
use crate::storage::{KeyValueStore, StorageError};

pub const VOICE_ENABLED_KEY: &str = "voiceEnabled";
pub const CURRENT_VIEW_KEY: &str = "currentView";
pub const SELECTED_PERSONA_KEY: &str = "selectedPersona";
pub const CURRENT_PERSONA_KEY: &str = "currentPersona";

/// Layout of the chat and code panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    #[default]
    Split,
    Chat,
    Code,
}

impl ViewMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewMode::Split => "split",
            ViewMode::Chat => "chat",
            ViewMode::Code => "code",
        }
    }

    /// Moves one step toward `target`: from the opposite extreme back to
    /// split, from split to the target. Already at the target stays put.
    pub fn toggled_toward(self, target: ViewMode) -> ViewMode {
        match (target, self) {
            (ViewMode::Chat, ViewMode::Code) | (ViewMode::Code, ViewMode::Chat) => ViewMode::Split,
            (ViewMode::Chat, ViewMode::Split) => ViewMode::Chat,
            (ViewMode::Code, ViewMode::Split) => ViewMode::Code,
            _ => self,
        }
    }
}

impl Display for ViewMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "split" => Ok(ViewMode::Split),
            "chat" => Ok(ViewMode::Chat),
            "code" => Ok(ViewMode::Code),
            other => Err(format!("unknown view mode: {other}")),
        }
    }
}

/// User preferences mirrored into the key-value store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preferences {
    pub voice_enabled: bool,
    pub view: ViewMode,
    pub selected_persona: String,
    /// Text of the persona currently in effect.
    pub current_persona: String,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            view: ViewMode::Split,
            selected_persona: DEFAULT_PERSONA_NAME.to_string(),
            current_persona: DEFAULT_PERSONA.to_string(),
        }
    }
}

impl Preferences {
    /// Reads stored preferences; missing or unreadable values keep their
    /// defaults.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut preferences = Self::default();
        if let Some(value) = read_key(store, VOICE_ENABLED_KEY) {
            preferences.voice_enabled = value == "true";
        }
        if let Some(value) = read_key(store, CURRENT_VIEW_KEY) {
            match value.parse() {
                Ok(view) => preferences.view = view,
                Err(error) => warn!(key = CURRENT_VIEW_KEY, %error, "ignoring stored view"),
            }
        }
        if let Some(value) = read_key(store, SELECTED_PERSONA_KEY) {
            if !value.trim().is_empty() {
                preferences.selected_persona = value;
            }
        }
        if let Some(value) = read_key(store, CURRENT_PERSONA_KEY) {
            if !value.trim().is_empty() {
                preferences.current_persona = value;
            }
        }
        preferences
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<(), StorageError> {
        store.set(VOICE_ENABLED_KEY, if self.voice_enabled { "true" } else { "false" })?;
        store.set(CURRENT_VIEW_KEY, self.view.as_str())?;
        store.set(SELECTED_PERSONA_KEY, &self.selected_persona)?;
        store.set(CURRENT_PERSONA_KEY, &self.current_persona)
    }
}

fn read_key(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(error) => {
            warn!(key, %error, "preference read failed");
            None
        }
    }
}
