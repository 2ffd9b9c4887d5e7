// src/app.rs
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::attachment::{DocumentAttachment, UploadFile};
use crate::backend::{ChatBackend, HealthStatus, HttpBackend, ModelInfo, PromptValidation};
use crate::config::Config;
use crate::error::{Result, ValidationError};
use crate::exchange::MessageExchange;
use crate::session::{Document, Message, Model, Session};
use crate::store::{Notification, SessionStore, StoreEvent};

#[derive(Debug, Default)]
struct Draft {
    input: String,
    model: Model,
}

/// Entry point for a front end: takes user intents, owns the input buffer and
/// the model picker, and exposes the store for rendering.
pub struct App {
    store: Arc<SessionStore>,
    backend: Arc<dyn ChatBackend>,
    exchange: MessageExchange,
    attachment: DocumentAttachment,
    draft: Mutex<Draft>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(config.api.base_url(), config.api.timeout())?;
        Ok(Self::with_backend(Arc::new(backend), config))
    }

    pub fn with_backend(backend: Arc<dyn ChatBackend>, config: &Config) -> Self {
        let store = Arc::new(SessionStore::new());
        App {
            exchange: MessageExchange::new(store.clone(), backend.clone()),
            attachment: DocumentAttachment::new(store.clone(), backend.clone(), config.uploads.max_bytes()),
            draft: Mutex::new(Draft {
                input: String::new(),
                model: config.model(),
            }),
            store,
            backend,
        }
    }

    fn draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.store.sessions()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.store.current()
    }

    pub fn is_loading(&self) -> bool {
        self.store.is_loading()
    }

    pub fn selected_model(&self) -> Model {
        self.draft().model
    }

    /// Applies to sessions created from now on.
    pub fn select_model(&self, model: Model) {
        log::debug!("Selected model {}", model);
        self.draft().model = model;
    }

    pub fn input(&self) -> String {
        self.draft().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.draft().input = text.into();
    }

    /// Loads the session list. Failures are logged and the old list is kept.
    pub async fn load_sessions(&self) -> Result<usize> {
        self.store.load_all(self.backend.as_ref()).await
    }

    pub async fn create_session(&self, system_prompt: &str) -> Result<Session> {
        let model = self.selected_model();
        match self.store.create_session(self.backend.as_ref(), system_prompt, model).await {
            Ok(session) => {
                self.store.notify(Notification::info(
                    "New chat session created",
                    format!("Using {} model", model.to_string().to_uppercase()),
                ));
                Ok(session)
            }
            Err(e) => {
                if e.is_remote() {
                    self.store.notify(Notification::error("Error", "Failed to create new session"));
                }
                Err(e)
            }
        }
    }

    pub fn switch_session(&self, session_id: &str) -> bool {
        self.store.set_current(session_id)
    }

    pub async fn refresh_current(&self) -> Result<Session> {
        let session_id = self.store.current_id().ok_or(ValidationError::NoCurrentSession)?;
        self.store.refresh_session(self.backend.as_ref(), &session_id).await
    }

    /// Sends whatever is in the input buffer. The buffer is cleared once the
    /// send is accepted and left alone when it is rejected.
    pub async fn submit_input(&self) -> Result<Message> {
        let content = {
            let mut draft = self.draft();
            if draft.input.trim().is_empty() {
                return Err(ValidationError::EmptyMessage.into());
            }
            if self.store.current_id().is_none() {
                return Err(ValidationError::NoCurrentSession.into());
            }
            std::mem::take(&mut draft.input)
        };
        self.exchange.send(&content).await
    }

    pub async fn send(&self, content: &str) -> Result<Message> {
        self.exchange.send(content).await
    }

    pub async fn attach(&self, file: UploadFile) -> Result<Document> {
        let session_id = self.store.current_id().ok_or(ValidationError::NoCurrentSession)?;
        self.attachment.attach(file, &session_id).await
    }

    pub async fn attach_path(&self, path: impl AsRef<Path>) -> Result<Document> {
        let path = path.as_ref();
        let file = match UploadFile::from_path(path).await {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Could not read {}: {}", path.display(), e);
                self.store.notify(Notification::error("Upload failed", e.to_string()));
                return Err(e);
            }
        };
        self.attach(file).await
    }

    pub fn detach(&self) -> Option<Document> {
        let session_id = self.store.current_id()?;
        self.attachment.detach(&session_id)
    }

    pub fn current_document(&self) -> Option<Document> {
        let session_id = self.store.current_id()?;
        self.attachment.document(&session_id)
    }

    pub async fn models(&self) -> Result<Vec<ModelInfo>> {
        self.backend.fetch_models().await
    }

    pub async fn prompt_templates(&self) -> Result<BTreeMap<String, String>> {
        self.backend.prompt_templates().await
    }

    pub async fn validate_prompt(&self, prompt: &str) -> Result<PromptValidation> {
        self.backend.validate_prompt(prompt).await
    }

    pub async fn health(&self) -> Result<HealthStatus> {
        self.backend.health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{session_fixture, FakeBackend};
    use crate::error::ChatError;

    fn app_with(backend: Arc<FakeBackend>) -> App {
        App::with_backend(backend, &Config::default())
    }

    #[tokio::test]
    async fn submit_clears_input_only_when_accepted() {
        let backend = Arc::new(FakeBackend::new());
        let app = app_with(backend.clone());

        app.set_input("hello");
        let err = app.submit_input().await.unwrap_err();
        assert_eq!(err, ChatError::Validation(ValidationError::NoCurrentSession));
        assert_eq!(app.input(), "hello");

        app.create_session("You are concise.").await.unwrap();
        app.submit_input().await.unwrap();
        assert_eq!(app.input(), "");
        assert_eq!(app.current_session().unwrap().messages.len(), 2);

        app.set_input("   ");
        assert!(app.submit_input().await.unwrap_err().is_validation());
        assert_eq!(app.input(), "   ");
    }

    #[tokio::test]
    async fn create_uses_selected_model_and_announces_it() {
        let backend = Arc::new(FakeBackend::new());
        let app = app_with(backend);
        app.select_model(Model::Groq);

        let session = app.create_session("Be brief.").await.unwrap();

        assert_eq!(session.model, Model::Groq);
        let notice = app.store().notifications().pop().unwrap();
        assert_eq!(notice.description, "Using GROQ model");
    }

    #[tokio::test]
    async fn failed_create_is_announced() {
        let backend = Arc::new(FakeBackend::new());
        let app = app_with(backend.clone());
        backend.fail_with(ChatError::Transport("refused".to_string()));

        assert!(app.create_session("Be brief.").await.is_err());

        assert!(app.sessions().is_empty());
        let notice = app.store().notifications().pop().unwrap();
        assert_eq!(notice.description, "Failed to create new session");
    }

    #[tokio::test]
    async fn detach_targets_current_session() {
        let backend = Arc::new(FakeBackend::with_sessions(vec![
            session_fixture("a", "Chat 1"),
            session_fixture("b", "Chat 2"),
        ]));
        let app = app_with(backend);
        app.load_sessions().await.unwrap();
        app.switch_session("a");
        app.attach(UploadFile::new("notes.txt", "text/plain", b"abc".to_vec()))
            .await
            .unwrap();

        app.switch_session("b");
        assert!(app.current_document().is_none());
        assert!(app.detach().is_none());

        app.switch_session("a");
        assert_eq!(app.detach().unwrap().name, "notes.txt");
    }

    #[tokio::test]
    async fn attach_path_reports_missing_file() {
        let backend = Arc::new(FakeBackend::with_sessions(vec![session_fixture("a", "Chat 1")]));
        let app = app_with(backend.clone());
        app.load_sessions().await.unwrap();
        app.switch_session("a");
        let calls_before = backend.call_count();

        let err = app.attach_path("/definitely/not/here.pdf").await.unwrap_err();

        assert!(matches!(err, ChatError::Io(_)));
        assert_eq!(backend.call_count(), calls_before);
    }
}
