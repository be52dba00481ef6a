use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use tracing::{debug, info, warn};
use unichat_ai::{
    ChatError, ChatErrorCode, CompletionTransport, ImageDescriber, Message, PersonaSource,
};

use crate::decoder::ChunkDecoder;
use crate::history::{ConversationHistory, DEFAULT_HISTORY_WINDOW, HISTORY_STORAGE_KEY};
use crate::preferences::{Preferences, ViewMode};
use crate::prompt::{
    build_messages, with_shared_image, ModelCatalog, DEFAULT_MODEL, DEFAULT_PERSONA_NAME,
};
use crate::registry::CodeBlockRegistry;
use crate::render::{Renderer, FAILURE_MESSAGE};
use crate::scanner::{ContentScanner, ScannerOptions};
use crate::speech::{speech_text, SpeechSink};
use crate::storage::KeyValueStore;
use crate::stream_state::{CommitOutcome, StreamState};
use crate::types::{RenderPlan, RequestPhase};

#[derive(Debug, Clone)]
pub struct ChatSessionConfig {
    pub model: String,
    pub catalog: ModelCatalog,
    pub history_window: usize,
    pub scanner: ScannerOptions,
}

impl Default for ChatSessionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            catalog: ModelCatalog::builtin(),
            history_window: DEFAULT_HISTORY_WINDOW,
            scanner: ScannerOptions::default(),
        }
    }
}

/// Monotonic request generation shared with whoever may abandon a request.
///
/// Each exchange captures the generation it started with; once the counter
/// moves on, the exchange stops committing and discards its effects.
#[derive(Debug, Clone, Default)]
pub struct GenerationHandle {
    counter: Arc<AtomicU64>,
}

impl GenerationHandle {
    pub fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Abandons the in-flight exchange, if any.
    pub fn supersede(&self) {
        self.advance();
    }

    fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Completed { response: String, plan: RenderPlan },
    Failed { error: ChatError },
    /// A newer request or an explicit cancel replaced this one.
    Superseded,
}

/// Session context owning everything one conversation needs.
pub struct ChatSession {
    config: ChatSessionConfig,
    scanner: ContentScanner,
    history: ConversationHistory,
    registry: CodeBlockRegistry,
    preferences: Preferences,
    transport: Arc<dyn CompletionTransport>,
    personas: Arc<dyn PersonaSource>,
    store: Arc<dyn KeyValueStore>,
    speech: Option<Arc<dyn SpeechSink>>,
    describer: Option<Arc<dyn ImageDescriber>>,
    pending_image: Option<String>,
    generation: GenerationHandle,
    phase: RequestPhase,
}

impl ChatSession {
    /// Restores history and preferences from `store`.
    pub fn new(
        config: ChatSessionConfig,
        transport: Arc<dyn CompletionTransport>,
        personas: Arc<dyn PersonaSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ChatError> {
        let scanner = ContentScanner::new(config.scanner.clone()).map_err(|error| {
            ChatError::new(
                ChatErrorCode::Configuration,
                format!("invalid scanner options: {error}"),
            )
        })?;
        let history = ConversationHistory::restore(store.as_ref(), config.history_window);
        let preferences = Preferences::load(store.as_ref());
        debug!(
            model = %config.model,
            history = history.len(),
            persona = %preferences.selected_persona,
            "chat session restored"
        );
        Ok(Self {
            config,
            scanner,
            history,
            registry: CodeBlockRegistry::new(),
            preferences,
            transport,
            personas,
            store,
            speech: None,
            describer: None,
            pending_image: None,
            generation: GenerationHandle::default(),
            phase: RequestPhase::Idle,
        })
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechSink>) -> Self {
        self.speech = Some(speech);
        self
    }

    pub fn with_image_describer(mut self, describer: Arc<dyn ImageDescriber>) -> Self {
        self.describer = Some(describer);
        self
    }

    /// Attaches an image to the next message. A later call replaces it.
    pub fn attach_image(&mut self, image_url: impl Into<String>) {
        self.pending_image = Some(image_url.into());
    }

    pub fn pending_image(&self) -> Option<&str> {
        self.pending_image.as_deref()
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        let model = model.into();
        if self.config.catalog.get(&model).is_none() {
            warn!(model = %model, "model has no prompt configuration, fallback prompt will be used");
        }
        self.config.model = model;
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.config.catalog
    }

    pub fn phase(&self) -> RequestPhase {
        self.phase
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn registry(&self) -> &CodeBlockRegistry {
        &self.registry
    }

    pub fn preferences(&self) -> &Preferences {
        &self.preferences
    }

    pub fn cancel_handle(&self) -> GenerationHandle {
        self.generation.clone()
    }

    /// Runs one exchange: builds the prompt, streams the response through
    /// the decoder and scanner, and records the finished turn.
    pub async fn send_message(
        &mut self,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> ExchangeOutcome {
        let generation = self.generation.advance();
        self.enter_phase(RequestPhase::Idle, renderer);
        let text = match self.pending_image.take() {
            Some(image_url) => {
                let summary = self.describe_attachment(&image_url).await;
                with_shared_image(text, &summary)
            }
            None => text.to_string(),
        };
        let text = text.as_str();

        let window = self.history.build_outbound_window();
        let messages = build_messages(
            &self.config.catalog,
            &self.config.model,
            text,
            &self.preferences.selected_persona,
            &window,
            self.personas.as_ref(),
        )
        .await;
        self.history.append(Message::user(text));
        if !self.generation.is_current(generation) {
            return self.abandon(StreamState::new(), renderer);
        }

        self.enter_phase(RequestPhase::Sending, renderer);
        info!(model = %self.config.model, messages = messages.len(), "sending chat request");
        let mut body = match self.transport.send_request(&messages, &self.config.model).await {
            Ok(body) => body,
            Err(error) => return self.fail(generation, StreamState::new(), error, renderer),
        };
        // The body is open once the transport hands it over, even if it
        // turns out to carry no chunks.
        self.enter_phase(RequestPhase::Streaming, renderer);

        let mut decoder = ChunkDecoder::new();
        let mut state = StreamState::new();
        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(error) => return self.fail(generation, state, error, renderer),
            };
            if !self.generation.is_current(generation) {
                return self.abandon(state, renderer);
            }
            let decoded = decoder.decode(&bytes);
            let outcome = self.ingest(&mut state, &decoded, renderer);
            renderer.render_plan(&outcome.plan, &self.registry);
        }

        if !self.generation.is_current(generation) {
            return self.abandon(state, renderer);
        }
        let tail = decoder.finish();
        if !tail.is_empty() {
            self.ingest(&mut state, &tail, renderer);
        }

        let response = state.accumulated_text().to_string();
        self.history.append(Message::assistant(response.clone()));
        if let Err(error) = self.history.persist(self.store.as_ref()) {
            warn!(%error, "failed to persist conversation history");
        }
        self.enter_phase(RequestPhase::Completed, renderer);

        let plan = state.plan();
        renderer.render_complete(&plan, &self.registry);
        info!(
            model = %self.config.model,
            chars = response.chars().count(),
            code_blocks = state.registered_blocks().len(),
            "chat response completed"
        );
        self.speak(&response);

        ExchangeOutcome::Completed { response, plan }
    }

    fn ingest(
        &mut self,
        state: &mut StreamState,
        text: &str,
        renderer: &mut dyn Renderer,
    ) -> CommitOutcome {
        state.push_text(text);
        let pass = state.scan(&self.scanner);
        let outcome = state.commit(pass, &mut self.registry);
        for registered in &outcome.registered {
            if let Some(block) = self.registry.get(&registered.id) {
                renderer.code_block_registered(block, registered.first_since_clear);
            }
        }
        outcome
    }

    fn fail(
        &mut self,
        generation: u64,
        state: StreamState,
        error: ChatError,
        renderer: &mut dyn Renderer,
    ) -> ExchangeOutcome {
        if !self.generation.is_current(generation) {
            return self.abandon(state, renderer);
        }
        warn!(
            model = %self.config.model,
            error = %error.as_compact_json(),
            "chat request failed"
        );
        self.enter_phase(RequestPhase::Failed, renderer);
        renderer.render_failure(FAILURE_MESSAGE);
        ExchangeOutcome::Failed { error }
    }

    /// Falls back to the URL itself when no description can be had, so the
    /// message still carries the image.
    async fn describe_attachment(&self, image_url: &str) -> String {
        let Some(describer) = &self.describer else {
            return image_url.to_string();
        };
        match describer.describe_image(image_url).await {
            Ok(description) => description,
            Err(error) => {
                warn!(image_url, %error, "image description failed, sharing the url instead");
                image_url.to_string()
            }
        }
    }

    fn enter_phase(&mut self, phase: RequestPhase, renderer: &mut dyn Renderer) {
        self.phase = phase;
        renderer.phase_changed(phase);
    }

    fn abandon(&mut self, state: StreamState, renderer: &mut dyn Renderer) -> ExchangeOutcome {
        debug!(
            discarded_blocks = state.registered_blocks().len(),
            "discarding superseded response"
        );
        state.discard(&mut self.registry);
        self.enter_phase(RequestPhase::Cancelled, renderer);
        ExchangeOutcome::Superseded
    }

    fn speak(&self, response: &str) {
        if !self.preferences.voice_enabled {
            return;
        }
        let Some(speech) = &self.speech else {
            return;
        };
        let text = speech_text(response);
        if !text.is_empty() {
            speech.speak(&text);
        }
    }

    /// Switches persona. `default` starts a fresh conversation; a named
    /// persona replaces the history with its document text. On error the
    /// session is left as it was.
    pub async fn load_persona(&mut self, name: &str) -> Result<(), ChatError> {
        let name = name.trim();
        if name.is_empty() || name == DEFAULT_PERSONA_NAME {
            self.store.remove(HISTORY_STORAGE_KEY)?;
            self.history.replace_with(Vec::new());
            let default_persona = self
                .config
                .catalog
                .get(&self.config.model)
                .map(|model| model.default_persona.clone())
                .unwrap_or_else(|| Preferences::default().current_persona);
            self.switch_persona(DEFAULT_PERSONA_NAME, default_persona);
            info!("reset to default persona");
            return Ok(());
        }

        let model = self.config.catalog.get(&self.config.model).ok_or_else(|| {
            ChatError::new(
                ChatErrorCode::Configuration,
                format!("model {} has no persona configuration", self.config.model),
            )
        })?;
        let document_id = model.persona_document(name).ok_or_else(|| {
            ChatError::new(
                ChatErrorCode::PersonaUnavailable,
                format!("Unknown persona: {name}"),
            )
        })?;
        let text = self.personas.fetch_text(document_id).await?;
        let persona = text.trim();
        if persona.is_empty() {
            return Err(ChatError::new(
                ChatErrorCode::PersonaUnavailable,
                "Empty persona received",
            ));
        }

        let mut history = ConversationHistory::new(self.config.history_window);
        history.append(Message::assistant(persona));
        history.persist(self.store.as_ref())?;
        self.history = history;
        self.switch_persona(name, persona.to_string());
        info!(persona = name, "loaded persona");
        Ok(())
    }

    fn switch_persona(&mut self, name: &str, persona: String) {
        self.registry.clear();
        self.preferences.selected_persona = name.to_string();
        self.preferences.current_persona = persona;
        self.preferences.view = ViewMode::Split;
        self.save_preferences();
    }

    pub fn clear_code_blocks(&mut self) {
        self.registry.clear();
    }

    pub fn set_voice_enabled(&mut self, enabled: bool) {
        self.preferences.voice_enabled = enabled;
        if !enabled {
            self.cancel_speech();
        }
        self.save_preferences();
    }

    pub fn cancel_speech(&self) {
        if let Some(speech) = &self.speech {
            speech.cancel();
        }
    }

    pub fn toggle_view(&mut self, target: ViewMode) -> ViewMode {
        self.preferences.view = self.preferences.view.toggled_toward(target);
        self.save_preferences();
        self.preferences.view
    }

    fn save_preferences(&self) {
        if let Err(error) = self.preferences.save(self.store.as_ref()) {
            warn!(%error, "failed to persist preferences");
        }
    }

    /// Abandons any in-flight exchange and writes session state out.
    pub fn shutdown(&mut self) -> Result<(), ChatError> {
        self.generation.supersede();
        self.cancel_speech();
        self.history.persist(self.store.as_ref())?;
        self.preferences.save(self.store.as_ref())?;
        self.store.flush()?;
        Ok(())
    }
}
