use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

mod app;

#[derive(Parser)]
#[command(name = "seekchat")]
#[command(about = "SeekChat - chat with a DeepSeek-compatible model about your code")]
#[command(version)]
struct Cli {
    /// Send a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// File treated as the open editor buffer
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Project name sent as context (defaults to the current directory name)
    #[arg(long)]
    project: Option<String>,

    /// Selected text sent as context
    #[arg(long)]
    selection: Option<String>,

    /// Apply file writes without asking
    #[arg(short, long)]
    yes: bool,

    /// Seconds to wait for a reply
    #[arg(long, default_value_t = seekchat_core::constants::limits::REQUEST_TIMEOUT_SECS)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// List models offered by the configured endpoint
    Models {
        /// Save the current model, or the first offered one if it is unavailable
        #[arg(long)]
        apply: bool,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show or clear saved conversation history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Show,
    /// Set one of ApiKey, ApiUrl, Model, SystemPrompt, Temperature, MaxTokens
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum HistoryAction {
    Show,
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Command::Models { apply }) => {
            let settings = app::open_settings()?;
            app::list_models(&settings, apply).await?;
        }
        Some(Command::Config { action }) => {
            let settings = app::open_settings()?;
            match action {
                ConfigAction::Show => app::print_config(&settings),
                ConfigAction::Set { key, value } => app::set_config(&settings, &key, &value)?,
            }
        }
        Some(Command::History { action }) => {
            let mut history = app::open_history();
            match action {
                HistoryAction::Show => app::print_history(&history),
                HistoryAction::Clear => {
                    history.clear()?;
                    println!("History cleared.");
                }
            }
        }
        None => {
            let mut host = app::ChatHost::open(app::HostOptions {
                file: cli.file,
                project: cli.project,
                selection: cli.selection,
                assume_yes: cli.yes,
                timeout: Duration::from_secs(cli.timeout_secs),
            })?;
            match cli.prompt {
                Some(prompt) => host.ask(&prompt).await?,
                None => host.run_repl().await?,
            }
        }
    }

    Ok(())
}
