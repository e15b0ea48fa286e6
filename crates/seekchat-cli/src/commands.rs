/// Result of processing a slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// Display a message to the user.
    Message(String),
    /// Quit the application.
    Quit,
    /// Print the transcript summaries of this session.
    ShowTranscript,
    /// Print the persisted conversation history.
    ShowHistory,
    /// Delete the persisted conversation history.
    ClearHistory,
    /// Query the endpoint for available models.
    ListModels,
    /// Print the current settings.
    ShowConfig,
    /// Change one setting and save.
    SetConfig { key: String, value: String },
    /// Not a command - treat as regular input.
    NotACommand,
}

pub fn handle_command(input: &str) -> CommandResult {
    let input = input.trim();
    let parts: Vec<&str> = input.splitn(2, ' ').collect();
    let cmd = parts[0];
    let arg = parts.get(1).map(|s| s.trim()).unwrap_or("");

    match cmd {
        "/help" | "/h" => show_help(),
        "/exit" | "/quit" | "/q" => CommandResult::Quit,
        "/transcript" => CommandResult::ShowTranscript,
        "/history" => CommandResult::ShowHistory,
        "/clear" => CommandResult::ClearHistory,
        "/models" => CommandResult::ListModels,
        "/config" => CommandResult::ShowConfig,
        "/set" => match arg.split_once(' ') {
            Some((key, value)) if !value.trim().is_empty() => CommandResult::SetConfig {
                key: key.to_string(),
                value: value.trim().to_string(),
            },
            _ => CommandResult::Message(
                "Usage: /set <key> <value>\nKeys: ApiKey, ApiUrl, Model, SystemPrompt, Temperature, MaxTokens"
                    .into(),
            ),
        },
        "/version" => CommandResult::Message(format!("SeekChat v{}", env!("CARGO_PKG_VERSION"))),
        _ => {
            if input.starts_with('/') {
                CommandResult::Message(format!("Unknown command: {cmd}. Type /help for commands."))
            } else {
                CommandResult::NotACommand
            }
        }
    }
}

fn show_help() -> CommandResult {
    let help_text = "\
SeekChat commands

  CONVERSATION
    /transcript               Show this session's messages
    /history                  Show saved conversation history
    /clear                    Delete saved conversation history

  SETTINGS
    /config                   Show current settings
    /set <key> <value>        Change a setting and save it
    /models                   List models offered by the endpoint

  OTHER
    /help, /h                 Show this help message
    /version                  Show version information
    /exit, /quit, /q          Quit

  Press Ctrl-C while waiting for a reply to cancel the request.";

    CommandResult::Message(help_text.into())
}
