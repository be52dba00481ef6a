use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use unichat_ai::{
    ByteStream, ChatError, ChatErrorCode, CompletionTransport, ImageDescriber, Message, Role,
    StaticPersonaSource,
};
use unichat_core::{
    ChatSession, ChatSessionConfig, CodeBlock, CodeBlockRegistry, ExchangeOutcome,
    GenerationHandle, KeyValueStore, MemoryStore, RenderPlan, RenderSegment, Renderer,
    RequestPhase, SpeechSink, ViewMode, DEFAULT_PERSONA, FAILURE_MESSAGE, HISTORY_STORAGE_KEY,
};

type Script = Result<Vec<Result<Vec<u8>, ChatError>>, ChatError>;

#[derive(Default)]
struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<(Vec<Message>, String)>>,
}

impl ScriptedTransport {
    fn with_chunks(chunks: &[&[u8]]) -> Arc<Self> {
        let transport = Self::default();
        transport.push_chunks(chunks);
        Arc::new(transport)
    }

    fn push_chunks(&self, chunks: &[&[u8]]) {
        self.push(Ok(chunks.iter().map(|chunk| Ok(chunk.to_vec())).collect()));
    }

    fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    fn requests(&self) -> Vec<(Vec<Message>, String)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn send_request(
        &self,
        messages: &[Message],
        model: &str,
    ) -> Result<ByteStream, ChatError> {
        self.requests
            .lock()
            .unwrap()
            .push((messages.to_vec(), model.to_string()));
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("a scripted response for every request");
        let chunks = script?;
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[derive(Default)]
struct RecordingRenderer {
    plans: Vec<RenderPlan>,
    completed: Vec<RenderPlan>,
    failures: Vec<String>,
    registered: Vec<(CodeBlock, bool)>,
    phases: Vec<RequestPhase>,
    supersede_after_plans: Option<(usize, GenerationHandle)>,
}

impl Renderer for RecordingRenderer {
    fn render_plan(&mut self, plan: &RenderPlan, blocks: &CodeBlockRegistry) {
        for id in plan.code_references() {
            assert!(blocks.get(id).is_some(), "referenced block {id} is registered");
        }
        self.plans.push(plan.clone());
        if let Some((count, handle)) = &self.supersede_after_plans {
            if self.plans.len() == *count {
                handle.supersede();
            }
        }
    }

    fn code_block_registered(&mut self, block: &CodeBlock, first_since_clear: bool) {
        self.registered.push((block.clone(), first_since_clear));
    }

    fn render_complete(&mut self, plan: &RenderPlan, _blocks: &CodeBlockRegistry) {
        self.completed.push(plan.clone());
    }

    fn render_failure(&mut self, message: &str) {
        self.failures.push(message.to_string());
    }

    fn phase_changed(&mut self, phase: RequestPhase) {
        self.phases.push(phase);
    }
}

#[derive(Default)]
struct RecordingSpeech {
    spoken: Mutex<Vec<String>>,
    cancels: Mutex<usize>,
}

impl SpeechSink for RecordingSpeech {
    fn speak(&self, text: &str) {
        self.spoken.lock().unwrap().push(text.to_string());
    }

    fn cancel(&self) {
        *self.cancels.lock().unwrap() += 1;
    }
}

fn session_with(
    transport: Arc<ScriptedTransport>,
    personas: StaticPersonaSource,
    store: Arc<MemoryStore>,
) -> ChatSession {
    ChatSession::new(
        ChatSessionConfig::default(),
        transport,
        Arc::new(personas),
        store,
    )
    .expect("session builds")
}

#[tokio::test]
async fn fence_split_across_three_chunks_becomes_one_code_reference() {
    let transport = ScriptedTransport::with_chunks(&[b"Hello [CO", b"DE]print(1)[/CO", b"DE] world"]);
    let store = Arc::new(MemoryStore::new());
    let mut session = session_with(transport.clone(), StaticPersonaSource::new(), store.clone());
    let mut renderer = RecordingRenderer::default();

    let outcome = session.send_message("run it", &mut renderer).await;

    let ExchangeOutcome::Completed { response, plan } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(response, "Hello [CODE]print(1)[/CODE] world");
    let registry = session.registry();
    assert_eq!(registry.len(), 1);
    let block = registry.latest().expect("one block");
    assert_eq!(block.raw_code, "print(1)");
    assert_eq!(
        plan.segments,
        vec![
            RenderSegment::text("Hello "),
            RenderSegment::CodeReference {
                block_id: block.id.clone(),
                language: "javascript".to_string(),
            },
            RenderSegment::text(" world"),
        ]
    );

    assert_eq!(renderer.plans.len(), 3);
    assert_eq!(renderer.plans[0].code_references().count(), 0);
    assert_eq!(renderer.plans[1].code_references().count(), 0);
    assert_eq!(renderer.completed, vec![plan]);
    assert_eq!(renderer.registered.len(), 1);
    assert!(renderer.registered[0].1);
    assert_eq!(session.phase(), RequestPhase::Completed);

    let history = session.history().snapshot();
    assert_eq!(
        history,
        vec![
            Message::user("run it"),
            Message::assistant("Hello [CODE]print(1)[/CODE] world")
        ]
    );
    let stored = store.get(HISTORY_STORAGE_KEY).unwrap().expect("history persisted");
    let stored: Vec<Message> = serde_json::from_str(&stored).unwrap();
    assert_eq!(stored, history);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1, "unity");
    assert_eq!(requests[0].0.last(), Some(&Message::user("run it")));
}

#[tokio::test]
async fn multibyte_characters_split_between_chunks_decode_intact() {
    let text = "héllo 🦀 wörld";
    let bytes = text.as_bytes();
    let transport = ScriptedTransport::with_chunks(&[&bytes[..2], &bytes[2..9], &bytes[9..]]);
    let mut session = session_with(
        transport,
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    );
    let mut renderer = RecordingRenderer::default();

    let outcome = session.send_message("hi", &mut renderer).await;
    let ExchangeOutcome::Completed { response, .. } = outcome else {
        panic!("expected completion");
    };
    assert_eq!(response, text);
    assert!(renderer
        .plans
        .iter()
        .flat_map(|plan| plan.segments.iter())
        .filter_map(RenderSegment::as_text)
        .all(|segment| !segment.contains('\u{FFFD}')));
}

#[tokio::test]
async fn http_failure_renders_failure_and_keeps_history_clean() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Err(ChatError::new(
        ChatErrorCode::Http,
        "Text request failed with status 500",
    )));
    let store = Arc::new(MemoryStore::new());
    let mut session = session_with(transport, StaticPersonaSource::new(), store.clone());
    let mut renderer = RecordingRenderer::default();

    let outcome = session.send_message("hi", &mut renderer).await;

    let ExchangeOutcome::Failed { error } = outcome else {
        panic!("expected failure");
    };
    assert!(error.is_transport());
    assert_eq!(renderer.failures, vec![FAILURE_MESSAGE.to_string()]);
    assert!(renderer.completed.is_empty());
    assert_eq!(session.phase(), RequestPhase::Failed);
    assert_eq!(session.history().snapshot(), vec![Message::user("hi")]);
    assert_eq!(store.get(HISTORY_STORAGE_KEY).unwrap(), None);
}

#[tokio::test]
async fn mid_stream_error_drops_partial_assistant_turn() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Ok(vec![
        Ok(b"[CODE]a[/CODE] and".to_vec()),
        Err(ChatError::new(ChatErrorCode::Transport, "connection reset")),
    ]));
    let mut session = session_with(
        transport,
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    );
    let mut renderer = RecordingRenderer::default();

    let outcome = session.send_message("hi", &mut renderer).await;

    assert!(matches!(outcome, ExchangeOutcome::Failed { .. }));
    assert_eq!(renderer.plans.len(), 1);
    assert_eq!(renderer.failures.len(), 1);
    assert!(session
        .history()
        .messages()
        .iter()
        .all(|message| message.role != Role::Assistant));
    assert_eq!(session.registry().len(), 1);
}

#[tokio::test]
async fn superseded_stream_discards_its_blocks() {
    let transport = ScriptedTransport::with_chunks(&[b"[CODE]x[/CODE] a", b" b", b" c"]);
    let mut session = session_with(
        transport.clone(),
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    );
    let mut renderer = RecordingRenderer {
        supersede_after_plans: Some((1, session.cancel_handle())),
        ..RecordingRenderer::default()
    };

    let outcome = session.send_message("hi", &mut renderer).await;

    assert_eq!(outcome, ExchangeOutcome::Superseded);
    assert_eq!(session.phase(), RequestPhase::Cancelled);
    assert_eq!(renderer.plans.len(), 1);
    assert!(renderer.completed.is_empty());
    assert!(session.registry().is_empty());
    assert_eq!(session.history().snapshot(), vec![Message::user("hi")]);

    transport.push_chunks(&[b"fresh"]);
    let mut renderer = RecordingRenderer::default();
    let outcome = session.send_message("again", &mut renderer).await;
    assert!(matches!(outcome, ExchangeOutcome::Completed { .. }));
}

#[tokio::test]
async fn restored_history_is_windowed_into_the_request() {
    let store = Arc::new(MemoryStore::new());
    let mut seeded = vec![Message::system("stale system entry")];
    for index in 0..12 {
        seeded.push(Message::user(format!("q{index}")));
        seeded.push(Message::assistant(format!("a{index}")));
    }
    store
        .set(HISTORY_STORAGE_KEY, &serde_json::to_string(&seeded).unwrap())
        .unwrap();

    let transport = ScriptedTransport::with_chunks(&[b"ok"]);
    let mut session = session_with(transport.clone(), StaticPersonaSource::new(), store);
    assert_eq!(session.history().len(), seeded.len());

    session
        .send_message("latest", &mut RecordingRenderer::default())
        .await;

    let (messages, _) = transport.requests().remove(0);
    // persona entry, ten replayed turns, the new message
    assert_eq!(messages.len(), 12);
    assert_eq!(messages[0].role, Role::Assistant);
    assert!(messages[0].content.starts_with(DEFAULT_PERSONA));
    assert_eq!(messages[1], Message::user("q7"));
    assert_eq!(messages[10], Message::assistant("a11"));
    assert_eq!(messages[11], Message::user("latest"));
    assert!(messages.iter().all(|message| message.role != Role::System));
}

#[tokio::test]
async fn corrupt_stored_history_starts_empty() {
    let store = Arc::new(MemoryStore::new());
    store.set(HISTORY_STORAGE_KEY, "{{definitely not json").unwrap();

    let session = session_with(
        Arc::new(ScriptedTransport::default()),
        StaticPersonaSource::new(),
        store.clone(),
    );

    assert!(session.history().is_empty());
    assert_eq!(store.get(HISTORY_STORAGE_KEY).unwrap(), None);
}

#[tokio::test]
async fn loading_personas_replaces_and_resets_history() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::with_chunks(&[b"[CODE]old[/CODE]"]);
    let personas = StaticPersonaSource::new()
        .with_document("coder", "  I write code.  ")
        .with_document("work", "   ");
    let mut session = session_with(transport.clone(), personas, store.clone());
    session
        .send_message("before", &mut RecordingRenderer::default())
        .await;
    assert_eq!(session.registry().len(), 1);
    session.toggle_view(ViewMode::Chat);

    session.load_persona("coder").await.expect("coder loads");
    assert_eq!(
        session.history().snapshot(),
        vec![Message::assistant("I write code.")]
    );
    assert!(session.registry().is_empty());
    assert_eq!(session.preferences().selected_persona, "coder");
    assert_eq!(session.preferences().current_persona, "I write code.");
    assert_eq!(session.preferences().view, ViewMode::Split);
    assert!(store.get(HISTORY_STORAGE_KEY).unwrap().is_some());

    let error = session.load_persona("work").await.expect_err("blank persona");
    assert_eq!(error.code, ChatErrorCode::PersonaUnavailable);
    let error = session.load_persona("pirate").await.expect_err("unknown persona");
    assert_eq!(error.code, ChatErrorCode::PersonaUnavailable);
    assert_eq!(session.preferences().selected_persona, "coder");
    assert_eq!(session.history().len(), 1);

    transport.push_chunks(&[b"sure"]);
    session
        .send_message("next", &mut RecordingRenderer::default())
        .await;
    let (messages, _) = transport.requests().pop().expect("second request");
    assert!(messages[0].content.starts_with("  I write code.  \n\n"));
    assert_eq!(messages[1], Message::assistant("I write code."));

    session.load_persona("default").await.expect("default loads");
    assert!(session.history().is_empty());
    assert_eq!(store.get(HISTORY_STORAGE_KEY).unwrap(), None);
    assert_eq!(session.preferences().current_persona, DEFAULT_PERSONA);
}

#[tokio::test]
async fn completed_responses_are_spoken_without_code() {
    let transport = ScriptedTransport::with_chunks(&[b"Run [CODE]rm -rf /tmp/x[/CODE] then relax."]);
    let speech = Arc::new(RecordingSpeech::default());
    let mut session = session_with(
        transport.clone(),
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    )
    .with_speech(speech.clone());

    session
        .send_message("hi", &mut RecordingRenderer::default())
        .await;
    assert_eq!(
        speech.spoken.lock().unwrap().clone(),
        vec!["Run then relax.".to_string()]
    );

    session.set_voice_enabled(false);
    assert_eq!(*speech.cancels.lock().unwrap(), 1);

    transport.push_chunks(&[b"quiet now"]);
    session
        .send_message("again", &mut RecordingRenderer::default())
        .await;
    assert_eq!(speech.spoken.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn shutdown_flushes_history_and_preferences() {
    let store = Arc::new(MemoryStore::new());
    let transport = ScriptedTransport::with_chunks(&[b"bye"]);
    let mut session = session_with(transport, StaticPersonaSource::new(), store.clone());
    session
        .send_message("hi", &mut RecordingRenderer::default())
        .await;
    session.set_voice_enabled(false);

    session.shutdown().expect("shutdown succeeds");

    assert_eq!(store.get("voiceEnabled").unwrap().as_deref(), Some("false"));
    assert_eq!(store.get("currentView").unwrap().as_deref(), Some("split"));
    let reopened = session_with(
        Arc::new(ScriptedTransport::default()),
        StaticPersonaSource::new(),
        store,
    );
    assert_eq!(reopened.history().len(), 2);
    assert!(!reopened.preferences().voice_enabled);
}

#[tokio::test]
async fn empty_body_still_passes_through_streaming() {
    let transport = ScriptedTransport::with_chunks(&[]);
    let mut session = session_with(
        transport,
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    );
    let mut renderer = RecordingRenderer::default();

    let outcome = session.send_message("anyone there?", &mut renderer).await;

    let ExchangeOutcome::Completed { response, .. } = outcome else {
        panic!("expected completion");
    };
    assert!(response.is_empty());
    assert!(renderer.plans.is_empty());
    assert_eq!(
        renderer.phases,
        vec![
            RequestPhase::Idle,
            RequestPhase::Sending,
            RequestPhase::Streaming,
            RequestPhase::Completed,
        ]
    );
}

#[tokio::test]
async fn rejected_request_never_reaches_streaming() {
    let transport = Arc::new(ScriptedTransport::default());
    transport.push(Err(ChatError::new(ChatErrorCode::Http, "HTTP 503")));
    let mut session = session_with(
        transport,
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    );
    let mut renderer = RecordingRenderer::default();

    session.send_message("hi", &mut renderer).await;

    assert_eq!(
        renderer.phases,
        vec![RequestPhase::Idle, RequestPhase::Sending, RequestPhase::Failed]
    );
}

struct FixedDescriber {
    answer: Result<String, ChatError>,
    seen: Mutex<Vec<String>>,
}

impl FixedDescriber {
    fn new(answer: Result<String, ChatError>) -> Arc<Self> {
        Arc::new(Self {
            answer,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ImageDescriber for FixedDescriber {
    async fn describe_image(&self, image_url: &str) -> Result<String, ChatError> {
        self.seen.lock().unwrap().push(image_url.to_string());
        self.answer.clone()
    }
}

#[tokio::test]
async fn attached_image_is_described_into_the_user_turn() {
    let transport = ScriptedTransport::with_chunks(&[b"A tabby."]);
    let describer = FixedDescriber::new(Ok("A striped cat.".to_string()));
    let mut session = session_with(
        transport.clone(),
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    )
    .with_image_describer(describer.clone());
    let mut renderer = RecordingRenderer::default();

    session.attach_image("https://x.com/cat.png");
    assert_eq!(session.pending_image(), Some("https://x.com/cat.png"));
    session
        .send_message("[Attached Image: cat.png] what breed?", &mut renderer)
        .await;

    let expected = "what breed?\n\n[Shared Image: A striped cat.]";
    let requests = transport.requests();
    let sent = requests[0].0.last().expect("user message sent");
    assert_eq!(sent.role, Role::User);
    assert_eq!(sent.content, expected);
    assert_eq!(session.history().messages()[0].content, expected);
    assert_eq!(*describer.seen.lock().unwrap(), vec!["https://x.com/cat.png"]);
    assert_eq!(session.pending_image(), None);
}

#[tokio::test]
async fn failed_description_shares_the_image_url() {
    let transport = ScriptedTransport::with_chunks(&[b"ok"]);
    transport.push_chunks(&[b"again"]);
    let describer = FixedDescriber::new(Err(ChatError::new(ChatErrorCode::Http, "HTTP 500")));
    let mut session = session_with(
        transport.clone(),
        StaticPersonaSource::new(),
        Arc::new(MemoryStore::new()),
    )
    .with_image_describer(describer.clone());
    let mut renderer = RecordingRenderer::default();

    session.attach_image("https://x.com/dog.jpg");
    let outcome = session.send_message("look", &mut renderer).await;
    assert!(matches!(outcome, ExchangeOutcome::Completed { .. }));
    session.send_message("and now?", &mut renderer).await;

    let requests = transport.requests();
    assert_eq!(
        requests[0].0.last().map(|m| m.content.as_str()),
        Some("look\n\n[Shared Image: https://x.com/dog.jpg]")
    );
    assert_eq!(
        requests[1].0.last().map(|m| m.content.as_str()),
        Some("and now?")
    );
    assert_eq!(describer.seen.lock().unwrap().len(), 1);
}
