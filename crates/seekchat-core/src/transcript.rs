use chrono::{DateTime, Local};
use std::fmt;

use crate::constants::limits;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    You,
    Assistant,
    Error,
    /// Raw server output that did not match the expected shape.
    Debug,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Sender::You => "You",
            Sender::Assistant => "Assistant",
            Sender::Error => "Error",
            Sender::Debug => "Debug",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptEntry {
    pub sender: Sender,
    pub text: String,
    pub at: DateTime<Local>,
}

impl TranscriptEntry {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
            at: Local::now(),
        }
    }

    /// One-line label for a history list: sender plus the first characters
    /// of the text.
    pub fn summary(&self) -> String {
        let head: String = self.text.chars().take(limits::SUMMARY_CHARS).collect();
        if head.len() < self.text.len() {
            format!("{}: {}...", self.sender, head)
        } else {
            format!("{}: {}", self.sender, head)
        }
    }

    /// Rich-text form for panels that render HTML.
    pub fn render_html(&self) -> String {
        format!("<b>{}:</b> {}", self.sender, escape_html(&self.text))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '\n' => out.push_str("<br>"),
            '\r' => {}
            c => out.push(c),
        }
    }
    out
}

/// Append-only record of what the panel shows.
#[derive(Debug, Clone, Default)]
pub struct ChatTranscript {
    entries: Vec<TranscriptEntry>,
}

impl ChatTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sender: Sender, text: impl Into<String>) -> &TranscriptEntry {
        self.entries.push(TranscriptEntry::new(sender, text));
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&TranscriptEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
