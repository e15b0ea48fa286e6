use serde::Deserialize;

use crate::edit::EditAction;
use crate::error::{ChatError, Result};

/// Assistant text plus any edit the response asked for.
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    pub text: String,
    pub edit: EditAction,
}

/// A completed 2xx exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeOutcome {
    Reply(AssistantReply),
    /// Valid JSON in an unexpected shape, kept verbatim for display.
    Diagnostic(String),
}

#[derive(Debug, Deserialize)]
struct CompletionBody {
    choices: Vec<Choice>,
    #[serde(flatten)]
    edit: EditFields,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
    #[serde(flatten)]
    edit: EditFields,
}

#[derive(Debug, Default, Deserialize)]
struct EditFields {
    action: Option<String>,
    file: Option<String>,
    new_content: Option<String>,
}

impl EditFields {
    /// Message-level fields win; the response root fills the gaps.
    fn or(self, fallback: EditFields) -> EditFields {
        EditFields {
            action: self.action.or(fallback.action),
            file: self.file.or(fallback.file),
            new_content: self.new_content.or(fallback.new_content),
        }
    }

    fn into_action(self) -> EditAction {
        EditAction::from_directive(
            self.action.as_deref(),
            self.file.as_deref(),
            self.new_content.as_deref(),
        )
    }
}

/// Parse a chat-completions response body.
///
/// Invalid JSON is an error. JSON without `choices[0].message.content` is a
/// [`ExchangeOutcome::Diagnostic`] carrying the raw body.
pub fn parse_completion(body: &str) -> Result<ExchangeOutcome> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

    let parsed = match serde_json::from_value::<CompletionBody>(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!("Response is not a chat completion: {}", e);
            return Ok(ExchangeOutcome::Diagnostic(body.to_string()));
        }
    };

    let root_edit = parsed.edit;
    let Some(choice) = parsed.choices.into_iter().next() else {
        tracing::debug!("Response has no choices");
        return Ok(ExchangeOutcome::Diagnostic(body.to_string()));
    };

    let edit = choice.message.edit.or(root_edit).into_action();
    Ok(ExchangeOutcome::Reply(AssistantReply {
        text: choice.message.content,
        edit,
    }))
}
