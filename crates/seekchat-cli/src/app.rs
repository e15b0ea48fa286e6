use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use seekchat_cli::{handle_command, CommandResult, FileBuffer, LineReader, PromptConfirmer};
use seekchat_core::config::SettingsField;
use seekchat_core::context::StaticEditor;
use seekchat_core::edit::ActiveBuffer;
use seekchat_core::*;

/// Editor context and behaviour taken from the command line.
pub struct HostOptions {
    pub file: Option<PathBuf>,
    pub project: Option<String>,
    pub selection: Option<String>,
    pub assume_yes: bool,
    pub timeout: Duration,
}

enum Waited {
    Done(Option<SessionUpdate>),
    Interrupted,
}

/// A chat session plus the host-side pieces it needs to apply edits.
pub struct ChatHost {
    session: ChatSession,
    applier: EditApplier,
    buffer: Option<FileBuffer>,
    lines: LineReader,
}

impl ChatHost {
    pub fn open(options: HostOptions) -> Result<Self> {
        let settings = Arc::new(open_settings()?);
        let history = open_history();

        let editor = StaticEditor {
            file: options.file.as_ref().map(|p| p.display().to_string()),
            selection: options.selection,
            project: options.project.or_else(current_dir_name),
        };
        let session = ChatSession::new(
            settings,
            history,
            Arc::new(HttpTransport::new()),
            Arc::new(editor),
        )
        .with_timeout(options.timeout);

        let lines = LineReader::stdin();
        let applier = if options.assume_yes {
            EditApplier::new(|_: &EditPreview| true)
        } else {
            EditApplier::new(PromptConfirmer::new(lines.clone()))
        };

        Ok(Self {
            session,
            applier,
            buffer: options.file.map(FileBuffer::new),
            lines,
        })
    }

    /// Send one message and wait for its result. Ctrl-C cancels the request.
    pub async fn ask(&mut self, prompt: &str) -> Result<()> {
        if self.session.send(prompt)?.is_none() {
            return Ok(());
        }

        let waited = tokio::select! {
            update = self.session.next_update() => Waited::Done(update),
            _ = tokio::signal::ctrl_c() => Waited::Interrupted,
        };

        match waited {
            Waited::Interrupted => {
                self.session.cancel();
                eprintln!("\nRequest cancelled.");
                Ok(())
            }
            Waited::Done(None) => Ok(()),
            Waited::Done(Some(SessionUpdate::Reply { text, edit })) => {
                println!("{text}");
                if !edit.is_none() {
                    self.apply_edit(&edit)?;
                }
                Ok(())
            }
            Waited::Done(Some(SessionUpdate::Diagnostic(raw))) => {
                eprintln!("[debug] Full API response: {raw}");
                Ok(())
            }
            Waited::Done(Some(SessionUpdate::Failed(e))) => Err(e.into()),
        }
    }

    fn apply_edit(&self, edit: &EditAction) -> Result<()> {
        let buffer = self.buffer.as_ref().map(|b| b as &dyn ActiveBuffer);
        match self.applier.apply(edit, buffer)? {
            ApplyOutcome::Nothing => {}
            ApplyOutcome::ReplacedBuffer => eprintln!("[edit] Replaced the open file."),
            ApplyOutcome::Written { path, bytes } => {
                eprintln!("[edit] Wrote {} bytes to {}", bytes, path.display())
            }
            ApplyOutcome::Declined => eprintln!("[edit] Changes discarded."),
        }
        Ok(())
    }

    pub async fn run_repl(&mut self) -> Result<()> {
        let settings = self.session.settings().clone();
        println!("SeekChat ({}) - type /help for commands", settings.model());
        if let Err(reason) = settings.validity() {
            eprintln!("Settings incomplete: {reason}. Use /set <key> <value> to fix.");
        }

        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = self.lines.next_line().await? else {
                break;
            };

            match handle_command(&line) {
                CommandResult::Quit => break,
                CommandResult::NotACommand => {
                    if let Err(e) = self.ask(&line).await {
                        eprintln!("Error: {e}");
                    }
                }
                CommandResult::Message(msg) => println!("{msg}"),
                CommandResult::ShowTranscript => {
                    for entry in self.session.transcript().entries() {
                        println!("{}", entry.summary());
                    }
                }
                CommandResult::ShowHistory => print_history(self.session.history()),
                CommandResult::ClearHistory => match self.session.clear_history() {
                    Ok(()) => println!("History cleared."),
                    Err(e) => eprintln!("Error: {e}"),
                },
                CommandResult::ListModels => {
                    tokio::select! {
                        listed = list_models(&settings, false) => {
                            if let Err(e) = listed {
                                eprintln!("Error: {e}");
                            }
                        }
                        _ = tokio::signal::ctrl_c() => eprintln!("\nModel listing cancelled."),
                    }
                }
                CommandResult::ShowConfig => print_config(&settings),
                CommandResult::SetConfig { key, value } => {
                    if let Err(e) = set_config(&settings, &key, &value) {
                        eprintln!("Error: {e}");
                    }
                }
            }
        }

        self.session.cancel();
        Ok(())
    }
}

pub fn open_settings() -> Result<SettingsStore> {
    SettingsStore::open_default().context("Failed to load settings")
}

pub fn open_history() -> ConversationHistory {
    ConversationHistory::open(ConversationHistory::default_path())
}

fn current_dir_name() -> Option<String> {
    std::env::current_dir()
        .ok()?
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

/// Print the models the endpoint offers. With `apply`, keep the current model
/// if offered, otherwise switch to the first one and save.
pub async fn list_models(settings: &SettingsStore, apply: bool) -> Result<()> {
    let current = settings.get();
    let models = ModelCatalog::fetch_models(&HttpTransport::new(), &current).await?;
    if models.is_empty() {
        println!("The endpoint listed no models.");
    }
    for model in &models {
        let marker = if model.id == current.model { "*" } else { " " };
        println!("{} {:<24} {}", marker, model.id, model.description);
    }

    if apply {
        let chosen = ModelCatalog::choose_model(&current.model, &models);
        if settings.set_model(chosen.as_str()) {
            settings.save()?;
            println!("Model set to {chosen}");
        }
    }
    Ok(())
}

pub fn print_config(settings: &SettingsStore) {
    let current = settings.get();
    for field in SettingsField::ALL {
        let value = match field {
            SettingsField::ApiKey if current.api_key.is_empty() => "(not set)".to_string(),
            SettingsField::ApiKey => mask_key(&current.api_key),
            _ => field.read(&current),
        };
        println!("{:<14} {}", field.key(), value.replace('\n', "\\n"));
    }
    match settings.validity() {
        Ok(()) => println!("Status         ready"),
        Err(reason) => println!("Status         {reason}"),
    }
}

pub fn set_config(settings: &SettingsStore, key: &str, value: &str) -> Result<()> {
    let field = SettingsField::from_key(key).ok_or_else(|| {
        anyhow!(
            "Unknown setting '{key}'. Expected one of: {}",
            SettingsField::ALL.map(|f| f.key()).join(", ")
        )
    })?;
    settings.set(field, value)?;
    settings.save()?;
    let shown = match field {
        SettingsField::ApiKey => mask_key(&settings.api_key()),
        _ => field.read(&settings.get()),
    };
    println!("{} = {}", field.key(), shown);
    if let Err(reason) = settings.validity() {
        eprintln!("Settings still incomplete: {reason}");
    }
    Ok(())
}

pub fn print_history(history: &ConversationHistory) {
    if history.is_empty() {
        println!("No saved conversations.");
        return;
    }
    for entry in history.entries() {
        let preview: String = entry.message.chars().take(60).collect();
        println!("{}  {}", entry.timestamp, preview.replace('\n', " "));
    }
}

fn mask_key(key: &str) -> String {
    let tail: String = key.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
    format!("****{tail}")
}
