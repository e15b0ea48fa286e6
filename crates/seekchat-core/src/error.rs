use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Settings are incomplete; the message is the validation reason.
    #[error("{0}")]
    ConfigInvalid(String),

    #[error("Invalid API URL: {0}")]
    InvalidEndpoint(String),

    #[error("A request is already in progress")]
    Busy,

    #[error("{}", format_network(.status, .message, .body))]
    Network {
        status: Option<u16>,
        message: String,
        body: Option<String>,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid JSON response: {0}")]
    MalformedResponse(String),

    #[error("Write error: {path}: {message}")]
    FileWrite { path: String, message: String },

    #[error("No active editor to apply the change to")]
    NoActiveEditor,

    #[error("Edit action has no target file")]
    EmptyTargetPath,

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChatError {
    pub fn network(status: Option<u16>, message: impl Into<String>, body: Option<String>) -> Self {
        Self::Network {
            status,
            message: message.into(),
            body: body.filter(|b| !b.is_empty()),
        }
    }

    pub fn file_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for failures the host should show as a blocking dialog rather
    /// than an inline transcript line.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::FileWrite { .. } | Self::NoActiveEditor | Self::EmptyTargetPath
        )
    }
}

fn format_network(status: &Option<u16>, message: &str, body: &Option<String>) -> String {
    let mut text = match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => format!("Network error: {}", message),
    };
    if let Some(body) = body {
        text.push_str("\nServer response: ");
        text.push_str(body);
    }
    text
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::Timeout;
        }
        Self::network(e.status().map(|s| s.as_u16()), e.to_string(), None)
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
