//! The authoritative in-memory collection of sessions.
//!
//! Every mutation goes through [`SessionStore`], which publishes a
//! [`StoreEvent`] afterwards so a front end can re-render. The current session
//! is kept as an id into the collection, never as a separate copy.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::broadcast;

use crate::backend::{ChatBackend, CreateSessionRequest};
use crate::error::{ChatError, Result, ValidationError};
use crate::session::{Document, Message, Model, Session, SessionId};

const EVENT_CAPACITY: usize = 256;
const MAX_NOTICES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient, user-visible toast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NoticeLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    SessionsLoaded,
    SessionCreated(SessionId),
    SessionRefreshed(SessionId),
    CurrentChanged(Option<SessionId>),
    MessageAppended { session_id: SessionId, message_id: String },
    DocumentChanged { session_id: SessionId },
    LoadingChanged(bool),
    Notice(Notification),
}

#[derive(Debug, Default)]
struct StoreState {
    sessions: Vec<Session>,
    current: Option<SessionId>,
    in_flight: usize,
    notices: VecDeque<Notification>,
    // Titles handed to create requests that have not come back yet.
    reserved_titles: HashSet<String>,
}

impl StoreState {
    fn session_mut(&mut self, session_id: &str) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    fn next_title(&self) -> String {
        let mut n = self.sessions.len() + 1;
        loop {
            let title = format!("Chat {}", n);
            if !self.reserved_titles.contains(&title) && !self.sessions.iter().any(|s| s.title == title) {
                return title;
            }
            n += 1;
        }
    }
}

pub struct SessionStore {
    state: Mutex<StoreState>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(StoreState::default()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // A panic while holding the lock cannot leave the state half-written, so
    // recover the guard instead of propagating the poison.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    pub async fn load_all(&self, backend: &dyn ChatBackend) -> Result<usize> {
        let sessions = match backend.fetch_sessions().await {
            Ok(sessions) => sessions,
            Err(e) => {
                log::error!("Failed to load sessions: {}", e);
                return Err(e);
            }
        };

        let count = sessions.len();
        let current_changed = {
            let mut state = self.lock();
            state.sessions = sessions;
            let keep = state
                .current
                .as_ref()
                .map_or(false, |id| state.sessions.iter().any(|s| &s.id == id));
            if !keep && state.current.is_some() {
                state.current = None;
                true
            } else {
                false
            }
        };
        log::info!("Loaded {} sessions from backend", count);
        self.publish(StoreEvent::SessionsLoaded);
        if current_changed {
            self.publish(StoreEvent::CurrentChanged(None));
        }
        Ok(count)
    }

    pub async fn create_session(&self, backend: &dyn ChatBackend, system_prompt: &str, model: Model) -> Result<Session> {
        if system_prompt.trim().is_empty() {
            return Err(ValidationError::EmptySystemPrompt.into());
        }

        let reservation = self.reserve_title();
        let request = CreateSessionRequest {
            title: reservation.title.clone(),
            system_prompt: system_prompt.to_string(),
            model,
        };
        let mut session = backend.create_session(&request).await?;
        session.messages.clear();

        {
            let mut state = self.lock();
            state.reserved_titles.remove(&reservation.title);
            state.sessions.insert(0, session.clone());
            state.current = Some(session.id.clone());
        }
        log::info!("Created session {} ('{}', model: {})", session.id, session.title, session.model);
        self.publish(StoreEvent::SessionCreated(session.id.clone()));
        self.publish(StoreEvent::CurrentChanged(Some(session.id.clone())));
        Ok(session)
    }

    fn reserve_title(&self) -> TitleReservation<'_> {
        let mut state = self.lock();
        let title = state.next_title();
        state.reserved_titles.insert(title.clone());
        TitleReservation { store: self, title }
    }

    pub async fn refresh_session(&self, backend: &dyn ChatBackend, session_id: &str) -> Result<Session> {
        if !self.contains(session_id) {
            return Err(ValidationError::UnknownSession(session_id.to_string()).into());
        }
        let fresh = backend.fetch_session(session_id).await?;
        {
            let mut state = self.lock();
            match state.session_mut(session_id) {
                Some(slot) => *slot = fresh.clone(),
                None => return Err(ValidationError::UnknownSession(session_id.to_string()).into()),
            }
        }
        log::debug!("Refreshed session {} ({} messages)", session_id, fresh.messages.len());
        self.publish(StoreEvent::SessionRefreshed(session_id.to_string()));
        Ok(fresh)
    }

    pub fn set_current(&self, session_id: &str) -> bool {
        {
            let mut state = self.lock();
            if !state.sessions.iter().any(|s| s.id == session_id) {
                log::warn!("Attempted to switch to non-existent session ID: {}", session_id);
                return false;
            }
            if state.current.as_deref() == Some(session_id) {
                return true;
            }
            state.current = Some(session_id.to_string());
        }
        log::info!("Switched to session ID: {}", session_id);
        self.publish(StoreEvent::CurrentChanged(Some(session_id.to_string())));
        true
    }

    pub fn append_message(&self, session_id: &str, message: Message) -> Result<()> {
        let message_id = message.id.clone();
        {
            let mut state = self.lock();
            let session = state
                .session_mut(session_id)
                .ok_or_else(|| ChatError::from(ValidationError::UnknownSession(session_id.to_string())))?;
            session.add_message(message);
        }
        self.publish(StoreEvent::MessageAppended {
            session_id: session_id.to_string(),
            message_id,
        });
        Ok(())
    }

    pub fn set_document(&self, session_id: &str, document: Document) -> Result<()> {
        {
            let mut state = self.lock();
            let session = state
                .session_mut(session_id)
                .ok_or_else(|| ChatError::from(ValidationError::UnknownSession(session_id.to_string())))?;
            session.document = Some(document);
        }
        self.publish(StoreEvent::DocumentChanged {
            session_id: session_id.to_string(),
        });
        Ok(())
    }

    pub fn clear_document(&self, session_id: &str) -> Option<Document> {
        let removed = self.lock().session_mut(session_id).and_then(|s| s.document.take());
        if removed.is_some() {
            self.publish(StoreEvent::DocumentChanged {
                session_id: session_id.to_string(),
            });
        }
        removed
    }

    /// Marks a request as in flight until the returned guard is dropped, so a
    /// cancelled future still clears the loading flag.
    pub fn begin_request(&self) -> RequestGuard<'_> {
        let first = {
            let mut state = self.lock();
            state.in_flight += 1;
            state.in_flight == 1
        };
        if first {
            self.publish(StoreEvent::LoadingChanged(true));
        }
        RequestGuard { store: self }
    }

    fn end_request(&self) {
        let last = {
            let mut state = self.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            state.in_flight == 0
        };
        if last {
            self.publish(StoreEvent::LoadingChanged(false));
        }
    }

    pub fn is_loading(&self) -> bool {
        self.lock().in_flight > 0
    }

    pub fn notify(&self, notification: Notification) {
        {
            let mut state = self.lock();
            if state.notices.len() == MAX_NOTICES {
                state.notices.pop_front();
            }
            state.notices.push_back(notification.clone());
        }
        self.publish(StoreEvent::Notice(notification));
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notices.iter().cloned().collect()
    }

    pub fn take_notifications(&self) -> Vec<Notification> {
        self.lock().notices.drain(..).collect()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.lock().sessions.clone()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.lock().sessions.iter().find(|s| s.id == session_id).cloned()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().sessions.iter().any(|s| s.id == session_id)
    }

    pub fn current_id(&self) -> Option<SessionId> {
        self.lock().current.clone()
    }

    pub fn current(&self) -> Option<Session> {
        let state = self.lock();
        let id = state.current.as_ref()?;
        state.sessions.iter().find(|s| &s.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[must_use = "the request counts as in flight only while the guard is held"]
pub struct RequestGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.store.end_request();
    }
}

struct TitleReservation<'a> {
    store: &'a SessionStore,
    title: String,
}

impl Drop for TitleReservation<'_> {
    fn drop(&mut self) {
        self.store.lock().reserved_titles.remove(&self.title);
    }
}
