pub mod http;
pub mod wire;

#[cfg(test)]
pub(crate) mod fake;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::attachment::UploadFile;
use crate::error::Result;
use crate::session::{Message, Model, Session};

pub use http::HttpBackend;

/// Literal the backend expects in `document_context` when a document is attached.
pub const DOCUMENT_CONTEXT_FLAG: &str = "true";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct CreateSessionRequest {
    pub title: String,
    pub system_prompt: String,
    pub model: Model,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SendMessageRequest {
    pub content: String,
    pub model: Model,
    pub system_prompt: String,
    pub session_id: String,
    // Serialized as null, not skipped.
    pub document_context: Option<&'static str>,
}

impl SendMessageRequest {
    pub fn wants_document_context(&self) -> bool {
        self.document_context.is_some()
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UploadAck {
    pub message: String,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub processed: Option<bool>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PromptValidation {
    pub valid: bool,
    pub message: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Every network exchange with the chat backend goes through here.
///
/// Implementations make exactly one attempt per call. Failures come back as
/// [`crate::ChatError::Transport`] when the request could not be completed and
/// [`crate::ChatError::Server`] when the backend answered with an error status.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn fetch_sessions(&self) -> Result<Vec<Session>>;

    async fn fetch_session(&self, session_id: &str) -> Result<Session>;

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message>;

    async fn upload_document(&self, file: &UploadFile, session_id: &str) -> Result<UploadAck>;

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>>;

    async fn prompt_templates(&self) -> Result<BTreeMap<String, String>>;

    async fn validate_prompt(&self, prompt: &str) -> Result<PromptValidation>;

    async fn health(&self) -> Result<HealthStatus>;
}
