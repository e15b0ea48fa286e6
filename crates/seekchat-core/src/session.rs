use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::{SettingsEvent, SettingsStore};
use crate::context::{ConversationHistory, EditorContext, RequestBuilder};
use crate::edit::EditAction;
use crate::error::{ChatError, Result};
use crate::exchange::{ExchangeId, ExchangeManager, ExchangeState};
use crate::llm::{ChatTransport, ExchangeOutcome};
use crate::transcript::{ChatTranscript, Sender};

/// What a finished exchange did to the session.
#[derive(Debug)]
pub enum SessionUpdate {
    /// Assistant text was shown and recorded. `edit` is for the host to
    /// hand to an [`crate::edit::EditApplier`].
    Reply { text: String, edit: EditAction },
    /// The server answered in an unexpected shape; shown raw, not recorded.
    Diagnostic(String),
    Failed(ChatError),
}

/// Wires settings, history, the exchange manager and the transcript
/// together behind the panel's "send" and "close" actions.
pub struct ChatSession {
    settings: Arc<SettingsStore>,
    settings_events: broadcast::Receiver<SettingsEvent>,
    history: ConversationHistory,
    exchanges: ExchangeManager,
    transcript: ChatTranscript,
    editor: Arc<dyn EditorContext>,
}

impl ChatSession {
    pub fn new(
        settings: Arc<SettingsStore>,
        history: ConversationHistory,
        transport: Arc<dyn ChatTransport>,
        editor: Arc<dyn EditorContext>,
    ) -> Self {
        Self {
            settings_events: settings.subscribe(),
            exchanges: ExchangeManager::new(settings.clone(), transport),
            settings,
            history,
            transcript: ChatTranscript::new(),
            editor,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.exchanges = self.exchanges.with_timeout(timeout);
        self
    }

    /// Start an exchange for `text`.
    ///
    /// Blank input is ignored (`Ok(None)`). Invalid settings are reported in
    /// the transcript and returned as [`ChatError::ConfigInvalid`].
    pub fn send(&mut self, text: &str) -> Result<Option<ExchangeId>> {
        self.drain_settings_events();

        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if self.exchanges.is_outstanding() {
            return Err(ChatError::Busy);
        }
        if let Err(reason) = self.settings.validity() {
            self.transcript
                .push(Sender::Error, format!("Settings are incomplete: {}", reason));
            return Err(ChatError::ConfigInvalid(reason));
        }

        self.transcript.push(Sender::You, text);
        let dispatched = RequestBuilder::new(text)
            .with_editor(self.editor.as_ref())
            .build(&self.settings.get(), &self.history)
            .and_then(|request| self.exchanges.send(request));

        match dispatched {
            Ok(id) => Ok(Some(id)),
            Err(e) => {
                self.transcript.push(Sender::Error, e.to_string());
                self.exchanges.acknowledge();
                Err(e)
            }
        }
    }

    /// Wait for the outstanding exchange and apply its result. `None` when
    /// nothing is outstanding.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let finished = self.exchanges.next_completion().await?;

        let update = match finished.result {
            Ok(ExchangeOutcome::Reply(reply)) => {
                self.transcript.push(Sender::Assistant, reply.text.as_str());
                if let Err(e) = self.history.append(
                    finished.user_message,
                    reply.text.as_str(),
                    finished.context.history_context(),
                ) {
                    tracing::warn!("Failed to save conversation history: {}", e);
                }
                SessionUpdate::Reply {
                    text: reply.text,
                    edit: reply.edit,
                }
            }
            Ok(ExchangeOutcome::Diagnostic(raw)) => {
                self.transcript
                    .push(Sender::Debug, format!("Full API response: {}", raw));
                SessionUpdate::Diagnostic(raw)
            }
            Err(e) => {
                self.transcript.push(Sender::Error, e.to_string());
                SessionUpdate::Failed(e)
            }
        };

        self.exchanges.acknowledge();
        Some(update)
    }

    /// Abort the outstanding exchange, e.g. when the panel closes.
    pub fn cancel(&mut self) -> bool {
        let cancelled = self.exchanges.cancel();
        self.exchanges.acknowledge();
        cancelled
    }

    pub fn is_busy(&self) -> bool {
        self.exchanges.is_outstanding()
    }

    pub fn exchange_state(&self) -> ExchangeState {
        self.exchanges.state()
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn clear_history(&mut self) -> Result<()> {
        self.history.clear()
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.transcript
    }

    fn drain_settings_events(&mut self) {
        loop {
            match self.settings_events.try_recv() {
                Ok(event) => tracing::debug!("Settings changed: {:?}", event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Missed {} settings notifications", skipped)
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        if let Err(reason) = self.settings.validity() {
            tracing::debug!("Settings not valid: {}", reason);
        }
    }
}
