pub mod config;
pub mod constants;
pub mod context;
pub mod edit;
pub mod error;
pub mod exchange;
pub mod llm;
pub mod session;
pub mod transcript;

// Re-export key types
pub use config::{Settings, SettingsEvent, SettingsField, SettingsStore, TomlFileBackend};
pub use context::{ConversationHistory, EditorContext, HistoryEntry, PreparedRequest, RequestBuilder};
pub use edit::{ApplyOutcome, EditAction, EditApplier, EditKind, EditPreview};
pub use error::{ChatError, Result};
pub use exchange::{ExchangeId, ExchangeManager, ExchangeState};
pub use llm::{ChatTransport, ExchangeOutcome, HttpTransport, ModelCatalog, ModelInfo};
pub use session::{ChatSession, SessionUpdate};
pub use transcript::{ChatTranscript, Sender, TranscriptEntry};
