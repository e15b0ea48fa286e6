use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{limits, storage};
use crate::error::{ChatError, Result};
use crate::llm::ChatMessage;

/// Editor context recorded with a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

/// One persisted user/assistant turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub context: HistoryContext,
}

impl HistoryEntry {
    pub fn new(
        message: impl Into<String>,
        response: impl Into<String>,
        context: HistoryContext,
    ) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339_opts(SecondsFormat::Secs, false),
            message: message.into(),
            response: response.into(),
            context,
        }
    }

    /// Entries missing either side of the turn are left out of requests.
    fn is_complete(&self) -> bool {
        !self.message.is_empty() && !self.response.is_empty()
    }
}

/// Bounded, ordered log of completed turns (oldest first), optionally backed
/// by a JSON file that is rewritten whole on every change.
pub struct ConversationHistory {
    entries: VecDeque<HistoryEntry>,
    max_entries: usize,
    path: Option<PathBuf>,
}

impl ConversationHistory {
    /// History that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: limits::MAX_HISTORY_ENTRIES,
            path: None,
        }
    }

    /// History persisted at `path`, loaded immediately.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut history = Self {
            entries: VecDeque::new(),
            max_entries: limits::MAX_HISTORY_ENTRIES,
            path: Some(path.into()),
        };
        history.load();
        history
    }

    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(storage::APP_DIR)
            .join(storage::HISTORY_FILE)
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self.trim_if_needed();
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replace the in-memory log with the persisted one.
    ///
    /// A missing file leaves the history empty. An unreadable or malformed
    /// file is logged and also leaves it empty; nothing is partially loaded.
    pub fn load(&mut self) {
        self.entries.clear();
        let Some(path) = self.path.as_ref() else {
            return;
        };
        if !path.exists() {
            return;
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Failed to load history {}: {}", path.display(), e);
                return;
            }
        };

        match serde_json::from_str::<Vec<HistoryEntry>>(&content) {
            Ok(entries) => {
                self.entries = entries.into();
                self.trim_if_needed();
                tracing::debug!("Loaded {} history entries", self.entries.len());
            }
            Err(e) => {
                tracing::warn!(
                    "History file {} is not a JSON array of entries: {}",
                    path.display(),
                    e
                );
            }
        }
    }

    /// Record a completed turn, evict the oldest entries beyond the cap, then
    /// rewrite the history file.
    ///
    /// The in-memory log is updated even when persisting fails; the error is
    /// returned so the caller can report it.
    pub fn append(
        &mut self,
        message: impl Into<String>,
        response: impl Into<String>,
        context: HistoryContext,
    ) -> Result<()> {
        self.entries
            .push_back(HistoryEntry::new(message, response, context));
        self.trim_if_needed();
        self.save()
    }

    /// Write the whole log to the backing file, if any.
    pub fn save(&self) -> Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents).map_err(|e| {
            ChatError::file_write(tmp_path.display().to_string(), e.to_string())
        })?;
        fs::rename(&tmp_path, path)
            .map_err(|e| ChatError::file_write(path.display().to_string(), e.to_string()))?;
        Ok(())
    }

    /// Build the message sequence for a request:
    /// optional system prompt, then each stored turn as user/assistant
    /// (oldest first), then the new user message.
    pub fn project_to_messages(&self, system_prompt: &str, new_message: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.entries.len() * 2 + 2);
        if !system_prompt.is_empty() {
            messages.push(ChatMessage::system(system_prompt));
        }
        for entry in self.entries.iter().filter(|e| e.is_complete()) {
            messages.push(ChatMessage::user(&entry.message));
            messages.push(ChatMessage::assistant(&entry.response));
        }
        messages.push(ChatMessage::user(new_message));
        messages
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.save()
    }

    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.back()
    }

    fn trim_if_needed(&mut self) {
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use tempfile::TempDir;

    fn filled(n: usize) -> ConversationHistory {
        let mut history = ConversationHistory::in_memory();
        for i in 0..n {
            history
                .append(format!("m{}", i), format!("r{}", i), HistoryContext::default())
                .unwrap();
        }
        history
    }

    #[test]
    fn test_append_evicts_oldest_at_cap() {
        let mut history = filled(100);
        assert_eq!(history.len(), 100);
        assert_eq!(history.entries().next().unwrap().message, "m0");

        history
            .append("m100", "r100", HistoryContext::default())
            .unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(history.entries().next().unwrap().message, "m1");
        assert_eq!(history.last().unwrap().message, "m100");
    }

    #[test]
    fn test_append_below_cap_keeps_everything() {
        let history = filled(42);
        assert_eq!(history.len(), 42);
    }

    #[test]
    fn test_projection_order() {
        let mut history = ConversationHistory::in_memory();
        history.append("m1", "r1", HistoryContext::default()).unwrap();
        history.append("m2", "r2", HistoryContext::default()).unwrap();

        let messages = history.project_to_messages("S", "m3");
        let expected = vec![
            ChatMessage::system("S"),
            ChatMessage::user("m1"),
            ChatMessage::assistant("r1"),
            ChatMessage::user("m2"),
            ChatMessage::assistant("r2"),
            ChatMessage::user("m3"),
        ];
        assert_eq!(messages, expected);
    }

    #[test]
    fn test_projection_without_system_prompt_skips_incomplete() {
        let mut history = ConversationHistory::in_memory();
        history.append("m1", "", HistoryContext::default()).unwrap();
        history.append("m2", "r2", HistoryContext::default()).unwrap();

        let messages = history.project_to_messages("", "m3");
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "m2");
        assert_eq!(messages[2].content, "m3");
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("history.json");

        let mut history = ConversationHistory::open(&path);
        assert!(history.is_empty());
        let context = HistoryContext {
            file: Some("/src/main.rs".to_string()),
            project: Some("demo".to_string()),
        };
        history.append("hello", "hi", context.clone()).unwrap();

        let reloaded = ConversationHistory::open(&path);
        assert_eq!(reloaded.len(), 1);
        let entry = reloaded.last().unwrap();
        assert_eq!(entry.message, "hello");
        assert_eq!(entry.response, "hi");
        assert_eq!(entry.context, context);
        assert!(entry.timestamp.contains('T'));
    }

    #[test]
    fn test_malformed_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        fs::write(&path, "{\"not\": \"an array\"}").unwrap();
        assert!(ConversationHistory::open(&path).is_empty());

        fs::write(&path, "[{\"message\": \"ok\"}, 42]").unwrap();
        assert!(ConversationHistory::open(&path).is_empty());

        fs::write(&path, "garbage").unwrap();
        assert!(ConversationHistory::open(&path).is_empty());
    }

    #[test]
    fn test_saved_file_is_json_array() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let mut history = ConversationHistory::open(&path);
        history.append("q", "a", HistoryContext::default()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let array = raw.as_array().unwrap();
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["message"], "q");
        assert_eq!(array[0]["response"], "a");
        assert!(array[0]["context"].is_object());
    }
}
