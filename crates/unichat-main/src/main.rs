use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod chat;
mod config;
mod logging;
mod speech;
mod terminal;
mod unichat_home;

use config::UnichatToml;

#[derive(Parser, Debug)]
#[command(name = "unichat", version, about = "streaming chat client for the Pollinations text API")]
struct Cli {
    #[arg(long, global = true)]
    conf_dir: Option<PathBuf>,
    /// Model to chat with; overrides `chat.model` from unichat.toml.
    #[arg(long, global = true)]
    model: Option<String>,
    #[command(subcommand)]
    command: Option<RootCommand>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
enum RootCommand {
    /// Interactive chat (the default).
    Chat,
    /// List models offered by the text service.
    Models,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let home = unichat_home::resolve_unichat_home_dir(cli.conf_dir.as_deref());
    let config = UnichatToml::load(&home)?;
    logging::init_tracing(&home, &config.log);

    match cli.command.unwrap_or(RootCommand::Chat) {
        RootCommand::Chat => chat::run_chat(&home, &config, cli.model.as_deref()).await,
        RootCommand::Models => chat::run_models(&config).await,
    }
}
