// Library interface for seekchat-cli, so integration tests can reach the
// slash-command parser and the host adapters.

pub mod commands;
pub mod host;

pub use commands::{handle_command, CommandResult};
pub use host::{FileBuffer, LineReader, PromptConfirmer};
