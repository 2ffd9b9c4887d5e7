use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::wire::{WireMessage, WireSession};
use super::{
    ChatBackend, CreateSessionRequest, HealthStatus, ModelInfo, PromptValidation, SendMessageRequest, UploadAck,
};
use crate::attachment::UploadFile;
use crate::error::{ChatError, Result};
use crate::session::{Message, Session};

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    // /health sits at the server root, outside the api prefix.
    fn health_url(&self) -> Result<Url> {
        let base = Url::parse(&self.base_url)
            .map_err(|e| ChatError::Transport(format!("invalid base url '{}': {}", self.base_url, e)))?;
        base.join("/health")
            .map_err(|e| ChatError::Transport(format!("invalid health url: {}", e)))
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("Backend error: {} - {}", status, error_text);
            Err(ChatError::server(status.as_u16(), error_text))
        }
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>> {
        log::debug!("GET {}/sessions", self.base_url);
        let response = self.client.get(self.url("/sessions")).send().await?;
        let sessions: Vec<WireSession> = Self::read_json(response).await?;
        sessions.into_iter().map(Session::try_from).collect()
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Session> {
        log::debug!("GET {}/sessions/{}", self.base_url, session_id);
        let response = self
            .client
            .get(self.url(&format!("/sessions/{}", session_id)))
            .send()
            .await?;
        let session: WireSession = Self::read_json(response).await?;
        Session::try_from(session)
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session> {
        log::debug!("Creating session: {:?}", request);
        let response = self.client.post(self.url("/sessions")).json(request).send().await?;
        let session: WireSession = Self::read_json(response).await?;
        Session::try_from(session)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        log::debug!(
            "Sending message to session {} (model: {}, document context: {})",
            request.session_id,
            request.model,
            request.wants_document_context()
        );
        let response = self.client.post(self.url("/chat/message")).json(request).send().await?;
        let reply: WireMessage = Self::read_json(response).await?;
        let message = Message::try_from(reply)?;
        if !message.is_bot() {
            return Err(ChatError::decode(format!("reply {} is not a bot message", message.id)));
        }
        Ok(message)
    }

    async fn upload_document(&self, file: &UploadFile, session_id: &str) -> Result<UploadAck> {
        log::debug!(
            "Uploading {} ({} bytes, {}) for session {}",
            file.name,
            file.size(),
            file.mime,
            session_id
        );
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.name.clone())
            .mime_str(&file.mime)?;
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/documents/upload"))
            .query(&[("session_id", session_id)])
            .multipart(form)
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        let response = self.client.get(self.url("/models")).send().await?;
        Self::read_json(response).await
    }

    async fn prompt_templates(&self) -> Result<BTreeMap<String, String>> {
        let response = self.client.get(self.url("/prompts/templates")).send().await?;
        Self::read_json(response).await
    }

    async fn validate_prompt(&self, prompt: &str) -> Result<PromptValidation> {
        let response = self
            .client
            .post(self.url("/prompts/validate"))
            .json(&json!({ "prompt": prompt }))
            .send()
            .await?;
        Self::read_json(response).await
    }

    async fn health(&self) -> Result<HealthStatus> {
        let response = self.client.get(self.health_url()?).send().await?;
        Self::read_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_slash_from_base_url() {
        let backend = HttpBackend::with_client(Client::new(), "http://example.test/api/");
        assert_eq!(backend.base_url(), "http://example.test/api");
        assert_eq!(backend.url("/sessions"), "http://example.test/api/sessions");
    }

    #[test]
    fn health_lives_at_server_root() {
        let backend = HttpBackend::with_client(Client::new(), "http://example.test:8000/api");
        assert_eq!(backend.health_url().unwrap().as_str(), "http://example.test:8000/health");
    }

    #[test]
    fn send_request_serializes_missing_context_as_null() {
        let request = SendMessageRequest {
            content: "hello".to_string(),
            model: crate::session::Model::Gemini,
            system_prompt: "Be brief.".to_string(),
            session_id: "s1".to_string(),
            document_context: None,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gemini");
        assert!(value["document_context"].is_null());
        assert!(value.as_object().unwrap().contains_key("document_context"));
    }
}
