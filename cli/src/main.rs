use clap::Parser;
use clap_derive::{Parser, Subcommand, ValueEnum};
use config::{GEMINI_PROVIDER, Settings, load_env_file};
use llm::{ChatModel, GeminiProvider, ModelCapability, ModelProvider};
use scribe_core::{
    AgentMode, AgentOutcome, Attachment, AudioClip, ConfigError, FsVault, Pipeline, SessionConfig,
    Transcriber, VaultSession,
};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

mod commands;
mod logging;
mod terminal;

use terminal::{Console, Input, TerminalHost};

/// How often queued agent output is flushed while a turn runs
const EVENT_TICK: Duration = Duration::from_millis(30);

#[derive(Copy, Clone, ValueEnum, Debug, PartialEq, Eq)]
#[clap(rename_all = "lowercase")]
enum Mode {
    Chat,
    Stream,
}

impl From<Mode> for AgentMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Chat => AgentMode::Chat,
            Mode::Stream => AgentMode::Stream,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "scribe", author, version, about = "Edit a Markdown vault by talking to Gemini", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Vault directory (defaults to vault_dir in settings.toml)
    #[arg(long, global = true, env = "SCRIBE_VAULT")]
    vault: Option<PathBuf>,

    /// Gemini model for agent turns
    #[arg(long, global = true)]
    model: Option<String>,

    /// Tool rounds allowed per instruction
    #[arg(long, global = true)]
    max_iterations: Option<usize>,

    /// Do not send the vault's notes as context
    #[arg(long, global = true)]
    no_context: bool,

    #[arg(long, global = true, value_enum, default_value_t = Mode::Chat)]
    mode: Mode,

    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Custom base URL for Gemini API (e.g., for proxy)
    #[arg(long, global = true, env = "GEMINI_BASE_URL")]
    gemini_url: Option<String>,

    #[arg(long, short, global = true)]
    tracing: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a single instruction and exit
    Run {
        /// Voice instruction to transcribe first
        #[arg(long, conflicts_with_all = ["attach", "text"])]
        audio: Option<PathBuf>,

        /// Image or audio file sent along with the text
        #[arg(long)]
        attach: Vec<PathBuf>,

        text: Vec<String>,
    },
    /// Interactive chat (default)
    Chat,
    /// Print the instruction understood from a recording
    Transcribe { file: PathBuf },
    /// List available Gemini models
    Models,
    /// Store the Gemini API key, encrypted, in settings.toml
    SetKey { key: String },
}

fn create_provider(args: &Args, settings: &Settings) -> anyhow::Result<GeminiProvider> {
    let api_key = args
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .or_else(|| settings.get_api_key(GEMINI_PROVIDER))
        .ok_or(ConfigError::MissingApiKey)?;

    match &args.gemini_url {
        Some(url) => GeminiProvider::with_base_url(url, &api_key),
        None => GeminiProvider::new(&api_key),
    }
}

fn chat_model(provider: &GeminiProvider, name: &str) -> anyhow::Result<Arc<dyn ChatModel + Send + Sync>> {
    provider
        .create_chat_model(name)
        .ok_or_else(|| anyhow::anyhow!("Failed to create model {}", name))
}

fn vault_dir(args: &Args, settings: &Settings) -> anyhow::Result<PathBuf> {
    let dir = args
        .vault
        .clone()
        .or_else(|| settings.vault_dir.clone())
        .ok_or_else(|| anyhow::anyhow!("No vault given: pass --vault DIR or set vault_dir in settings.toml"))?;
    anyhow::ensure!(dir.is_dir(), "Vault {} is not a directory", dir.display());
    Ok(dir)
}

fn print_status_bar(model_name: &str, vault: &Path) {
    let terminal_width = crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
        .clamp(20, 120);
    let status = format!(" {} • {} ", model_name, vault.display());
    let status: String = status.chars().take(terminal_width - 2).collect();
    let padding = (terminal_width - 2).saturating_sub(status.chars().count());
    let left_pad = padding / 2;
    let right_pad = padding - left_pad;

    println!("┌{}┐", "─".repeat(terminal_width - 2));
    println!("│{}{}{}│", " ".repeat(left_pad), status, " ".repeat(right_pad));
    println!("└{}┘", "─".repeat(terminal_width - 2));
}

/// Drive `turn` to completion, printing agent events as they queue up.
async fn with_events<T>(console: &Console, turn: impl Future<Output = anyhow::Result<T>>) -> anyhow::Result<T> {
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            _ = tokio::time::sleep(EVENT_TICK) => console.drain(),
        }
    };
    console.finish();
    result
}

struct App {
    session: VaultSession,
    pipeline: Pipeline,
    console: Arc<Console>,
    input: Arc<Input>,
    vault: PathBuf,
}

impl App {
    async fn start(args: &Args, settings: &Settings, provider: &GeminiProvider) -> anyhow::Result<Self> {
        let vault = vault_dir(args, settings)?;
        let model_name = args.model.clone().unwrap_or_else(|| settings.model().to_string());
        let model = chat_model(provider, &model_name)?;
        let transcriber = Transcriber::new(chat_model(provider, config::DEFAULT_TRANSCRIPTION_MODEL)?);

        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let console = Arc::new(Console::new(rx, args.mode == Mode::Stream));
        let input = Arc::new(Input::stdin());
        let host = Arc::new(TerminalHost::new(input.clone(), console.clone()));

        let config = SessionConfig {
            max_iterations: args.max_iterations.unwrap_or_else(|| settings.max_iterations()),
            mode: args.mode.into(),
            load_context: !args.no_context,
            ..SessionConfig::default()
        };
        let session = VaultSession::start(Arc::new(FsVault::new(&vault)), host, model, config)
            .await?
            .with_events(tx);

        tracing::info!(vault = %vault.display(), model = %model_name, "Session started");
        Ok(App {
            session,
            pipeline: Pipeline::new(transcriber),
            console,
            input,
            vault,
        })
    }

    async fn run_text(&mut self, text: &str, attachments: &[Attachment]) -> anyhow::Result<AgentOutcome> {
        with_events(&self.console, self.pipeline.run_text(&mut self.session, text, attachments)).await
    }

    async fn run_audio(&mut self, path: &Path) -> anyhow::Result<AgentOutcome> {
        let clip = AudioClip::from_file(path).await?;
        let voice = with_events(&self.console, self.pipeline.run_audio(&mut self.session, &clip)).await?;
        Ok(voice.outcome)
    }

    async fn chat(&mut self) -> anyhow::Result<()> {
        println!();
        println!("Type /help for commands, Ctrl+D or /quit to exit.");
        println!();

        loop {
            print_status_bar(self.session.model_name(), &self.vault);
            let Some(line) = self.input.read_line("> ").await? else {
                println!();
                println!("Goodbye!");
                break;
            };

            let input = line.trim();
            if input.is_empty() {
                continue;
            }

            let result = if input.starts_with('/') {
                match commands::Command::parse(input) {
                    Ok(commands::Command::Quit) => {
                        println!("Goodbye!");
                        break;
                    }
                    Ok(commands::Command::Help) => {
                        commands::print_help();
                        Ok(())
                    }
                    Ok(commands::Command::Reset) => self.session.reset().await.map(|()| {
                        println!("Conversation reset.");
                    }),
                    Ok(commands::Command::Audio(path)) => self.run_audio(&path).await.map(|_| ()),
                    Err(err) => {
                        println!("{}", err);
                        Ok(())
                    }
                }
            } else {
                self.run_text(input, &[]).await.map(|_| ())
            };

            if let Err(e) = result {
                eprintln!("Error: {:#}", e);
            }
            println!();
        }

        let conversation = self.session.conversation();
        tracing::info!(
            messages = conversation.messages().len(),
            seeded = conversation.seed_len(),
            "Chat ended"
        );
        Ok(())
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = Settings::load();

    match args.command.as_ref().unwrap_or(&Command::Chat) {
        Command::SetKey { key } => {
            settings
                .set_api_key(GEMINI_PROVIDER, key.trim())
                .map_err(anyhow::Error::msg)?;
            settings.save().map_err(anyhow::Error::msg)?;
            println!("API key saved.");
        }
        Command::Models => {
            let models = create_provider(&args, &settings)?.list_models().await?;
            for model in models.iter().filter(|m| m.has_capability(&ModelCapability::Text)) {
                println!("{:<40} {}", model.id, model.name());
            }
        }
        Command::Transcribe { file } => {
            let provider = create_provider(&args, &settings)?;
            let model = chat_model(&provider, config::DEFAULT_TRANSCRIPTION_MODEL)?;
            let clip = AudioClip::from_file(file).await?;
            println!("{}", Transcriber::new(model).transcribe(&clip).await?);
        }
        Command::Run { audio, attach, text } => {
            let provider = create_provider(&args, &settings)?;
            let mut app = App::start(&args, &settings, &provider).await?;
            if let Some(path) = audio {
                app.run_audio(path).await?;
            } else {
                let mut attachments = Vec::with_capacity(attach.len());
                for path in attach {
                    attachments.push(Attachment::from_file(path).await?);
                }
                app.run_text(&text.join(" "), &attachments).await?;
            }
        }
        Command::Chat => {
            let provider = create_provider(&args, &settings)?;
            App::start(&args, &settings, &provider).await?.chat().await?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    load_env_file();
    let args = Args::parse();

    let _log_guard = logging::init(args.tracing);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "scribe failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
