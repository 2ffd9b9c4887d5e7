use thiserror::Error;

/// Rejections raised locally, before anything goes over the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("system prompt cannot be empty")]
    EmptySystemPrompt,
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("no session is selected")]
    NoCurrentSession,
    #[error("unknown session '{0}'")]
    UnknownSession(String),
    #[error("file type '{0}' is not allowed (PDF, TXT or DOCX only)")]
    DisallowedFileType(String),
    #[error("file is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// The request never completed (connect failure, timeout, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("io error: {0}")]
    Io(String),
}

impl ChatError {
    pub fn server(status: u16, body: impl Into<String>) -> Self {
        Self::Server {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// True for failures that happened after a request was attempted.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Server { .. } | Self::Decode(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ChatError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            ChatError::server(status.as_u16(), err.to_string())
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Io(err.to_string())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;
