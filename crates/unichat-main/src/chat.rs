use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::info;
use unichat_ai::{ModelCatalogSource, PollinationsClient};
use unichat_core::{ChatSession, CodeBlockId, JsonFileStore, ViewMode};

use crate::config::UnichatToml;
use crate::speech::CommandSpeech;
use crate::terminal::TerminalRenderer;
use crate::unichat_home::STATE_FILE_NAME;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    /// Reloads the selected persona, starting a fresh conversation.
    Clear,
    Persona { name: String },
    Voice,
    View { target: Option<ViewMode> },
    Code { id: String },
    /// Attaches an image URL to the next message.
    Image { url: String },
    /// Prints a generated-image link for the prompt.
    Imagine { prompt: String },
    Enhance { prompt: String },
    Search { query: String },
    History,
    Help,
    Exit,
    Prompt { text: String },
}

pub struct ReplCommandParser;

impl ReplCommandParser {
    pub fn parse(input: &str) -> Option<ReplCommand> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(name) = command_argument(trimmed, "/persona") {
            return Some(ReplCommand::Persona { name });
        }
        if let Some(target) = command_argument(trimmed, "/view") {
            return Some(ReplCommand::View {
                target: target.parse().ok(),
            });
        }
        if let Some(id) = command_argument(trimmed, "/code") {
            return Some(ReplCommand::Code { id });
        }
        if let Some(url) = command_argument(trimmed, "/image") {
            return Some(ReplCommand::Image { url });
        }
        if let Some(prompt) = command_argument(trimmed, "/imagine") {
            return Some(ReplCommand::Imagine { prompt });
        }
        if let Some(prompt) = command_argument(trimmed, "/enhance") {
            return Some(ReplCommand::Enhance { prompt });
        }
        if let Some(query) = command_argument(trimmed, "/search") {
            return Some(ReplCommand::Search { query });
        }

        match trimmed {
            "/clear" => Some(ReplCommand::Clear),
            "/voice" => Some(ReplCommand::Voice),
            "/history" => Some(ReplCommand::History),
            "/exit" | "/quit" => Some(ReplCommand::Exit),
            "/help" | "?" => Some(ReplCommand::Help),
            _ => Some(ReplCommand::Prompt {
                text: trimmed.to_string(),
            }),
        }
    }
}

/// Returns the trimmed argument when `input` is `command` or `command <arg>`.
fn command_argument(input: &str, command: &str) -> Option<String> {
    let rest = input.strip_prefix(command)?;
    (rest.is_empty() || rest.starts_with(char::is_whitespace)).then(|| rest.trim().to_string())
}

pub async fn run_chat(
    home: &Path,
    config: &UnichatToml,
    model_override: Option<&str>,
) -> Result<(), String> {
    let client = Arc::new(PollinationsClient::new(config.pollinations_config()));
    let personas = config.persona_source(home)?;
    let state_path = home.join(STATE_FILE_NAME);
    let store = JsonFileStore::open(&state_path)
        .map_err(|error| format!("open {} failed: {error}", state_path.display()))?;

    let mut session = ChatSession::new(
        config.session_config(model_override),
        client.clone(),
        Arc::new(personas),
        Arc::new(store),
    )
    .map_err(|error| error.to_string())?
    .with_image_describer(client.clone());
    if let Some(speech) = config
        .chat
        .speech_command
        .as_deref()
        .and_then(CommandSpeech::from_command_line)
    {
        session = session.with_speech(Arc::new(speech));
    }

    info!(model = session.model(), "chat started");
    println!(
        "unichat: model {} persona {} (type /help for commands)",
        session.model(),
        session.preferences().selected_persona
    );
    let result = repl_loop(&mut session, &client).await;
    session.shutdown().map_err(|error| error.to_string())?;
    result
}

async fn repl_loop(session: &mut ChatSession, client: &PollinationsClient) -> Result<(), String> {
    loop {
        print!("you> ");
        io::stdout()
            .flush()
            .map_err(|error| format!("stdout flush failed: {error}"))?;

        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .map_err(|error| format!("stdin read failed: {error}"))?;
        if read == 0 {
            println!();
            return Ok(());
        }

        let Some(command) = ReplCommandParser::parse(&line) else {
            continue;
        };

        match command {
            ReplCommand::Exit => return Ok(()),
            ReplCommand::Help => print_help(),
            ReplCommand::Clear => {
                let persona = session.preferences().selected_persona.clone();
                match session.load_persona(&persona).await {
                    Ok(()) => println!("conversation cleared ({persona})"),
                    Err(error) => eprintln!("clear failed: {error}"),
                }
            }
            ReplCommand::Persona { name } => {
                if name.is_empty() {
                    println!("persona: {}", session.preferences().selected_persona);
                    continue;
                }
                match session.load_persona(&name).await {
                    Ok(()) => println!("loaded persona: {name}"),
                    Err(error) => eprintln!("Error loading persona: {}", error.message),
                }
            }
            ReplCommand::Voice => {
                let enabled = !session.preferences().voice_enabled;
                session.set_voice_enabled(enabled);
                println!("voice {}", if enabled { "on" } else { "off" });
            }
            ReplCommand::View { target } => match target {
                Some(target @ (ViewMode::Chat | ViewMode::Code)) => {
                    println!("view: {}", session.toggle_view(target));
                }
                _ => println!("view: {} (use /view chat|code)", session.preferences().view),
            },
            ReplCommand::Code { id } => print_code_blocks(session, &id),
            ReplCommand::Image { url } => {
                if url.is_empty() {
                    match session.pending_image() {
                        Some(url) => println!("attached: {url}"),
                        None => println!("usage: /image <url>"),
                    }
                    continue;
                }
                session.attach_image(url);
                println!("image attached to your next message");
            }
            ReplCommand::Imagine { prompt } => match client.image_url(&prompt) {
                Ok(url) => println!("{url}"),
                Err(error) => eprintln!("image link failed: {}", error.message),
            },
            ReplCommand::Enhance { prompt } => {
                if prompt.is_empty() {
                    println!("usage: /enhance <prompt>");
                    continue;
                }
                match client.enhance_prompt(&prompt).await {
                    Ok(enhanced) => println!("{enhanced}"),
                    Err(error) => eprintln!("enhance failed: {}", error.message),
                }
            }
            ReplCommand::Search { query } => {
                if query.is_empty() {
                    println!("usage: /search <query>");
                    continue;
                }
                match client.search(&query).await {
                    Ok(answer) => println!("{}", answer.trim_end()),
                    Err(error) => eprintln!("search failed: {}", error.message),
                }
            }
            ReplCommand::History => {
                for message in session.history().messages() {
                    println!("[{}] {}", message.role.as_str(), message.content);
                }
            }
            ReplCommand::Prompt { text } => {
                print!("ai> ");
                let mut renderer = TerminalRenderer::new(io::stdout());
                session.send_message(&text, &mut renderer).await;
            }
        }
    }
}

fn print_code_blocks(session: &ChatSession, id: &str) {
    let registry = session.registry();
    if id.is_empty() {
        if registry.is_empty() {
            println!("(no code blocks)");
        }
        for block in registry.iter() {
            let first_line = block.raw_code.lines().next().unwrap_or_default();
            println!("{} [{}] {first_line}", block.id, block.language);
        }
        return;
    }
    match registry.get(&CodeBlockId::from(id)) {
        Some(block) => println!("{}", block.raw_code),
        None => eprintln!("unknown code block: {id}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  /clear            start over with the selected persona");
    println!("  /persona [name]   show or switch persona (default resets)");
    println!("  /voice            toggle speech output");
    println!("  /view chat|code   move the layout toward chat or code");
    println!("  /code [id]        list code blocks or print one");
    println!("  /image <url>      attach an image to your next message");
    println!("  /imagine <text>   print a generated-image link");
    println!("  /enhance <text>   rewrite a prompt to be more detailed");
    println!("  /search <query>   ask the search model");
    println!("  /history          print the conversation history");
    println!("  /help             show this help");
    println!("  /quit             exit");
}

pub async fn run_models(config: &UnichatToml) -> Result<(), String> {
    let client = PollinationsClient::new(config.pollinations_config());
    let models = client
        .list_models()
        .await
        .map_err(|error| error.to_string())?;
    for model in models {
        let mut flags = Vec::new();
        if model.censored {
            flags.push("censored");
        }
        if model.base_model {
            flags.push("base");
        }
        if flags.is_empty() {
            println!("{}\t{}", model.name, model.description);
        } else {
            println!("{}\t{} ({})", model.name, model.description, flags.join(", "));
        }
    }
    Ok(())
}
