mod builder;
mod editor;
mod history;

pub use builder::{endpoint_url, PreparedRequest, RequestBuilder};
pub use editor::{EditorContext, EditorSnapshot, NoEditor, StaticEditor};
pub use history::{ConversationHistory, HistoryContext, HistoryEntry};
