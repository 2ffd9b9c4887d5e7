// In-memory ChatBackend used by unit tests.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;

use super::{
    ChatBackend, CreateSessionRequest, HealthStatus, ModelInfo, PromptValidation, SendMessageRequest, UploadAck,
};
use crate::attachment::UploadFile;
use crate::error::{ChatError, Result};
use crate::session::{Message, Model, Role, Session};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    FetchSessions,
    FetchSession(String),
    CreateSession(CreateSessionRequest),
    SendMessage(SendMessageRequest),
    Upload { name: String, session_id: String },
    Other(&'static str),
}

pub(crate) struct FakeBackend {
    sessions: Mutex<Vec<Session>>,
    calls: Mutex<Vec<Call>>,
    failure: Mutex<Option<ChatError>>,
    gate: Option<Semaphore>,
    create_gate: Option<Semaphore>,
    next_id: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            gate: None,
            create_gate: None,
            next_id: AtomicUsize::new(1),
        }
    }

    /// send_message replies are held until `release` hands out a permit.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// Same as `gated`, but for create_session.
    pub fn gated_creates() -> Self {
        Self {
            create_gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    pub fn with_sessions(sessions: Vec<Session>) -> Self {
        let backend = Self::new();
        *backend.sessions.lock().unwrap() = sessions;
        backend
    }

    pub fn fail_with(&self, err: ChatError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap() = None;
    }

    pub fn release(&self, replies: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(replies);
        }
    }

    pub fn release_creates(&self, replies: usize) {
        if let Some(gate) = &self.create_gate {
            gate.add_permits(replies);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                Call::SendMessage(req) => Some(req.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn wait_for_sends(&self, count: usize) {
        while self.sent_messages().len() < count {
            tokio::task::yield_now().await;
        }
    }

    pub async fn wait_for_creates(&self, count: usize) {
        while self.calls().iter().filter(|c| matches!(c, Call::CreateSession(_))).count() < count {
            tokio::task::yield_now().await;
        }
    }

    fn record(&self, call: Call) -> Result<()> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

pub(crate) fn session_fixture(id: &str, title: &str) -> Session {
    Session {
        id: id.to_string(),
        title: title.to_string(),
        messages: Vec::new(),
        system_prompt: "You are concise.".to_string(),
        model: Model::Gemini,
        document: None,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn fetch_sessions(&self) -> Result<Vec<Session>> {
        self.record(Call::FetchSessions)?;
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Session> {
        self.record(Call::FetchSession(session_id.to_string()))?;
        self.sessions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
            .ok_or_else(|| ChatError::server(404, "Session not found"))
    }

    async fn create_session(&self, request: &CreateSessionRequest) -> Result<Session> {
        self.record(Call::CreateSession(request.clone()))?;
        if let Some(gate) = &self.create_gate {
            gate.acquire()
                .await
                .map_err(|e| ChatError::Transport(e.to_string()))?
                .forget();
        }
        let session = Session {
            id: self.next_id("session"),
            title: request.title.clone(),
            messages: Vec::new(),
            system_prompt: request.system_prompt.clone(),
            model: request.model,
            document: None,
            created_at: Utc::now(),
        };
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message> {
        self.record(Call::SendMessage(request.clone()))?;
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ChatError::Transport(e.to_string()))?
                .forget();
        }
        Ok(Message {
            id: self.next_id("bot"),
            content: format!("re: {}", request.content),
            role: Role::Bot,
            timestamp: Utc::now(),
            model: Some(request.model.to_string()),
        })
    }

    async fn upload_document(&self, file: &UploadFile, session_id: &str) -> Result<UploadAck> {
        self.record(Call::Upload {
            name: file.name.clone(),
            session_id: session_id.to_string(),
        })?;
        Ok(UploadAck {
            message: format!("Document {} processed", file.name),
            filename: Some(file.name.clone()),
            processed: Some(true),
        })
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>> {
        self.record(Call::Other("models"))?;
        Ok(vec![ModelInfo {
            id: "gemini".to_string(),
            name: "Gemini Pro".to_string(),
            description: String::new(),
            icon: None,
        }])
    }

    async fn prompt_templates(&self) -> Result<BTreeMap<String, String>> {
        self.record(Call::Other("templates"))?;
        Ok(BTreeMap::from([(
            "general".to_string(),
            "You are a helpful AI assistant.".to_string(),
        )]))
    }

    async fn validate_prompt(&self, prompt: &str) -> Result<PromptValidation> {
        self.record(Call::Other("validate"))?;
        Ok(PromptValidation {
            valid: !prompt.trim().is_empty(),
            message: String::new(),
        })
    }

    async fn health(&self) -> Result<HealthStatus> {
        self.record(Call::Other("health"))?;
        Ok(HealthStatus {
            status: "healthy".to_string(),
            timestamp: None,
        })
    }
}
