//! Streaming core of the chat client: chunk decoding, incremental content
//! scanning, code block registry, conversation history and the session
//! orchestrator that drives them.

mod decoder;
mod history;
mod orchestrator;
mod preferences;
mod prompt;
mod registry;
mod render;
mod scanner;
mod speech;
mod storage;
mod stream_state;
mod types;

pub use decoder::ChunkDecoder;
pub use history::{ConversationHistory, DEFAULT_HISTORY_WINDOW, HISTORY_STORAGE_KEY};
pub use orchestrator::{ChatSession, ChatSessionConfig, ExchangeOutcome, GenerationHandle};
pub use preferences::{
    Preferences, ViewMode, CURRENT_PERSONA_KEY, CURRENT_VIEW_KEY, SELECTED_PERSONA_KEY,
    VOICE_ENABLED_KEY,
};
pub use prompt::{
    build_messages, fallback_messages, with_shared_image, ModelCatalog, ModelConfig,
    DEFAULT_INSTRUCTION, DEFAULT_MODEL, DEFAULT_PERSONA, DEFAULT_PERSONA_NAME,
};
pub use registry::CodeBlockRegistry;
pub use render::{Renderer, FAILURE_MESSAGE};
pub use scanner::{
    ContentScanner, OpenRegion, RegionKind, ScanPass, ScannedSegment, ScannerOptions,
    DEFAULT_CODE_LANGUAGE, DEFAULT_IMAGE_EXTENSIONS, DEFAULT_IMAGE_HOSTS,
};
pub use speech::{speech_text, SpeechSink};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore, StorageError};
pub use stream_state::{CommitOutcome, RegisteredBlock, StreamState};
pub use types::{CodeBlock, CodeBlockId, RenderPlan, RenderSegment, RequestPhase};
