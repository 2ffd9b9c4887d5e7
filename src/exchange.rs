//! Optimistic send: the user's message is appended before the backend answers,
//! and the reply is reconciled into the session the send started from.
//!
//! Sends on one session run strictly one after another (FIFO). A queued send
//! appends its user message only once it reaches the front of the lane, so a
//! session's history always alternates user/bot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::backend::{ChatBackend, SendMessageRequest, DOCUMENT_CONTEXT_FLAG};
use crate::error::{Result, ValidationError};
use crate::session::{Message, SessionId};
use crate::store::{Notification, SessionStore};

pub struct MessageExchange {
    store: Arc<SessionStore>,
    backend: Arc<dyn ChatBackend>,
    lanes: Mutex<HashMap<SessionId, Arc<AsyncMutex<()>>>>,
}

impl MessageExchange {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            store,
            backend,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    fn lane(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut lanes = self.lanes.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        lanes.entry(session_id.to_string()).or_default().clone()
    }

    /// Sends `content` to the current session.
    pub async fn send(&self, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        let session_id = self.store.current_id().ok_or(ValidationError::NoCurrentSession)?;
        self.send_to(&session_id, content).await
    }

    /// Sends `content` to a specific session, whether or not it is current.
    pub async fn send_to(&self, session_id: &str, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(ValidationError::EmptyMessage.into());
        }
        if !self.store.contains(session_id) {
            return Err(ValidationError::UnknownSession(session_id.to_string()).into());
        }

        let lane = self.lane(session_id);
        let _turn = lane.lock().await;

        // Read after queueing so a document attached meanwhile is honoured.
        let session = self
            .store
            .session(session_id)
            .ok_or_else(|| ValidationError::UnknownSession(session_id.to_string()))?;

        let user_message = Message::new_user(content);
        log::debug!("Optimistically appending {} to session {}", user_message.id, session_id);
        self.store.append_message(session_id, user_message)?;

        let request = SendMessageRequest {
            content: content.to_string(),
            model: session.model,
            system_prompt: session.system_prompt.clone(),
            session_id: session.id.clone(),
            document_context: session.has_document().then_some(DOCUMENT_CONTEXT_FLAG),
        };

        let result = {
            let _loading = self.store.begin_request();
            self.backend.send_message(&request).await
        };

        match result {
            Ok(reply) => {
                log::info!("Received reply {} for session {}", reply.id, session_id);
                self.store.append_message(session_id, reply.clone())?;
                Ok(reply)
            }
            Err(e) => {
                // The user's message stays; only the reply is missing.
                log::error!("Send to session {} failed: {}", session_id, e);
                self.store.notify(Notification::error("Error", "Failed to send message"));
                Err(e)
            }
        }
    }

    /// True while some send on this session is queued or awaiting a reply.
    pub fn is_busy(&self, session_id: &str) -> bool {
        self.lane(session_id).try_lock().is_err()
    }
}
