use url::Url;

use crate::config::Settings;
use crate::constants::api;
use crate::context::{ConversationHistory, EditorContext, EditorSnapshot};
use crate::error::{ChatError, Result};
use crate::llm::ChatRequest;

/// A request ready for dispatch: where to send it, the wire body, and the
/// editor context that travels alongside it.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub endpoint: Url,
    pub api_key: Option<String>,
    pub body: ChatRequest,
    pub context: EditorSnapshot,
}

impl PreparedRequest {
    /// The message the user typed for this request.
    pub fn user_message(&self) -> &str {
        self.body.user_message().unwrap_or_default()
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.body)?)
    }
}

/// Composes a chat-completions request from settings, history and the live
/// editor context.
pub struct RequestBuilder {
    user_message: String,
    snapshot: EditorSnapshot,
}

impl RequestBuilder {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            snapshot: EditorSnapshot::default(),
        }
    }

    pub fn with_editor(mut self, editor: &dyn EditorContext) -> Self {
        self.snapshot = EditorSnapshot::capture(editor);
        self
    }

    pub fn with_snapshot(mut self, snapshot: EditorSnapshot) -> Self {
        self.snapshot = snapshot;
        self
    }

    pub fn build(self, settings: &Settings, history: &ConversationHistory) -> Result<PreparedRequest> {
        let endpoint = endpoint_url(&settings.endpoint, api::CHAT_COMPLETIONS)?;
        let messages = history.project_to_messages(&settings.system_prompt, &self.user_message);

        Ok(PreparedRequest {
            endpoint,
            api_key: settings.api_key().map(str::to_string),
            body: ChatRequest {
                model: settings.model.clone(),
                messages,
                temperature: settings.temperature,
                max_tokens: settings.max_tokens,
            },
            context: self.snapshot,
        })
    }
}

/// Resolve `operation` against `base`, making sure the path carries the API
/// version segment exactly once.
///
/// `https://api.deepseek.com` and `https://api.deepseek.com/v1/` both become
/// `https://api.deepseek.com/v1/{operation}`.
pub fn endpoint_url(base: &str, operation: &str) -> Result<Url> {
    let base = base.trim();
    let mut url =
        Url::parse(base).map_err(|e| ChatError::InvalidEndpoint(format!("{} ({})", base, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ChatError::InvalidEndpoint(base.to_string()));
    }

    let version = format!("/{}", api::VERSION_SEGMENT);
    let mut path = url.path().trim_end_matches('/').to_string();
    if !path.ends_with(&version) {
        path.push_str(&version);
    }
    path.push('/');
    path.push_str(operation.trim_start_matches('/'));
    url.set_path(&path);

    tracing::debug!("Resolved endpoint {}", url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{HistoryContext, StaticEditor};

    fn settings() -> Settings {
        Settings {
            api_key: "sk-test".to_string(),
            model: "deepseek-chat".to_string(),
            ..Settings::default()
        }
    }

    #[test]
    fn test_endpoint_normalization() {
        let cases = [
            ("https://api.deepseek.com", "https://api.deepseek.com/v1/chat/completions"),
            ("https://api.deepseek.com/", "https://api.deepseek.com/v1/chat/completions"),
            ("https://api.deepseek.com/v1", "https://api.deepseek.com/v1/chat/completions"),
            ("https://api.deepseek.com/v1/", "https://api.deepseek.com/v1/chat/completions"),
            ("http://localhost:8080/proxy", "http://localhost:8080/proxy/v1/chat/completions"),
        ];
        for (base, expected) in cases {
            assert_eq!(endpoint_url(base, "chat/completions").unwrap().as_str(), expected);
        }
        assert_eq!(
            endpoint_url("https://api.deepseek.com/v1", "/models").unwrap().as_str(),
            "https://api.deepseek.com/v1/models"
        );
    }

    #[test]
    fn test_endpoint_rejects_malformed() {
        assert!(matches!(
            endpoint_url("not a url", "chat/completions"),
            Err(ChatError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_url("mailto:someone@example.com", "chat/completions"),
            Err(ChatError::InvalidEndpoint(_))
        ));
        assert!(matches!(
            endpoint_url("ftp://example.com", "chat/completions"),
            Err(ChatError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_build_body_shape() {
        let mut history = ConversationHistory::in_memory();
        history.append("m1", "r1", HistoryContext::default()).unwrap();

        let request = RequestBuilder::new("m2")
            .build(&settings(), &history)
            .unwrap();

        let json: serde_json::Value = serde_json::from_slice(&request.to_json().unwrap()).unwrap();
        let object = json.as_object().unwrap();
        let mut keys: Vec<&str> = object.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["max_tokens", "messages", "model", "temperature"]);
        assert_eq!(json["model"], "deepseek-chat");
        assert_eq!(json["max_tokens"], 2048);
        assert_eq!(json["temperature"], 0.7);
        assert_eq!(json["messages"].as_array().unwrap().len(), 4);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][3]["content"], "m2");
        assert_eq!(request.user_message(), "m2");
        assert_eq!(request.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_editor_context_defaults_to_empty() {
        let request = RequestBuilder::new("hi")
            .build(&settings(), &ConversationHistory::in_memory())
            .unwrap();
        assert_eq!(request.context, EditorSnapshot::default());

        let editor = StaticEditor {
            file: Some("/work/app/src/main.rs".to_string()),
            selection: Some("let x = 1;".to_string()),
            project: Some("app".to_string()),
        };
        let request = RequestBuilder::new("hi")
            .with_editor(&editor)
            .build(&settings(), &ConversationHistory::in_memory())
            .unwrap();
        assert_eq!(request.context.filename, "/work/app/src/main.rs");
        assert_eq!(request.context.selection, "let x = 1;");
        assert_eq!(request.context.project, "app");
        assert_eq!(
            request.context.history_context(),
            HistoryContext {
                file: Some("/work/app/src/main.rs".to_string()),
                project: Some("app".to_string()),
            }
        );
    }
}
