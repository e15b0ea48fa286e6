//! SeekChat centralized constants.
//! Defaults, limits and wire strings shared by the core and its hosts.

// ─── Settings ─────────────────────────────────────────────────────────────────

pub mod defaults {
    pub const API_URL: &str = "https://api.deepseek.com/v1";
    /// Placeholder shown before a model has been picked; treated as "no model".
    pub const NO_MODEL: &str = "Without Model";
    pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant";
    pub const TEMPERATURE: f64 = 0.7;
    pub const MAX_TOKENS: u32 = 2048;
}

pub mod limits {
    pub const MIN_TEMPERATURE: f64 = 0.01;
    pub const MAX_TEMPERATURE: f64 = 2.0;
    pub const MIN_MAX_TOKENS: u32 = 16;
    pub const MAX_MAX_TOKENS: u32 = 32_000;

    /// Maximum number of persisted conversation turns.
    pub const MAX_HISTORY_ENTRIES: usize = 100;

    /// Seconds before an outstanding exchange is aborted.
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;

    /// Characters of a transcript entry shown in the history list.
    pub const SUMMARY_CHARS: usize = 50;
}

// ─── Persistence ──────────────────────────────────────────────────────────────

pub mod storage {
    pub const APP_DIR: &str = "seekchat";
    pub const SETTINGS_FILE: &str = "settings.toml";
    pub const HISTORY_FILE: &str = "conversation_history.json";
    pub const SETTINGS_GROUP: &str = "DeepSeek";

    pub mod keys {
        pub const API_KEY: &str = "ApiKey";
        pub const API_URL: &str = "ApiUrl";
        pub const MODEL: &str = "Model";
        pub const SYSTEM_PROMPT: &str = "SystemPrompt";
        pub const TEMPERATURE: &str = "Temperature";
        pub const MAX_TOKENS: &str = "MaxTokens";
    }
}

// ─── API ──────────────────────────────────────────────────────────────────────

pub mod api {
    pub const VERSION_SEGMENT: &str = "v1";
    pub const CHAT_COMPLETIONS: &str = "chat/completions";
    pub const MODELS: &str = "models";
}
