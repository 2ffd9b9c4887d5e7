use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use uuid::Uuid;

pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

/// Backend model selector. Fixed for the lifetime of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Model {
    #[default]
    Gemini,
    Groq,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub id: String,
    pub content: String,
    pub role: Role,
    pub timestamp: DateTime<Utc>,
    pub model: Option<String>, // only set on bot replies
}

impl Message {
    /// Builds the optimistic local copy of something the user typed.
    pub fn new_user(content: impl Into<String>) -> Self {
        Message {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            role: Role::User,
            timestamp: Utc::now(),
            model: None,
        }
    }

    pub fn is_bot(&self) -> bool {
        self.role == Role::Bot
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub name: String,
    pub uploaded_at: DateTime<Utc>,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub id: SessionId,
    pub title: String,
    pub messages: Vec<Message>,
    pub system_prompt: String,
    pub model: Model,
    pub document: Option<Document>,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn add_message(&mut self, mut message: Message) {
        // Server clocks may lag ours; keep the sequence non-decreasing.
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                log::debug!(
                    "Clamping timestamp of message {} in session {} ({} < {})",
                    message.id,
                    self.id,
                    message.timestamp,
                    last.timestamp
                );
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message);
    }

    pub fn has_document(&self) -> bool {
        self.document.is_some()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn empty_session() -> Session {
        Session {
            id: "s1".to_string(),
            title: "Chat 1".to_string(),
            messages: Vec::new(),
            system_prompt: "You are concise.".to_string(),
            model: Model::Gemini,
            document: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn model_parses_wire_names() {
        assert_eq!(Model::from_str("gemini").unwrap(), Model::Gemini);
        assert_eq!(Model::from_str("GROQ").unwrap(), Model::Groq);
        assert!(Model::from_str("gpt-4").is_err());
        assert_eq!(Model::Groq.to_string(), "groq");
    }

    #[test]
    fn user_messages_get_distinct_ids() {
        let a = Message::new_user("hi");
        let b = Message::new_user("hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.role, Role::User);
        assert!(a.model.is_none());
    }

    #[test]
    fn add_message_keeps_timestamps_non_decreasing() {
        let mut session = empty_session();
        let user = Message::new_user("hello");
        let user_ts = user.timestamp;
        session.add_message(user);

        let bot = Message {
            id: "b1".to_string(),
            content: "hi there".to_string(),
            role: Role::Bot,
            timestamp: user_ts - Duration::seconds(5),
            model: Some("gemini".to_string()),
        };
        session.add_message(bot);

        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[1].timestamp, user_ts);
        assert_eq!(session.messages[1].content, "hi there");
    }
}
