// Server-shaped payloads. Timestamps travel as text and are parsed on the way in.
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::{ChatError, Result};
use crate::session::{Document, Message, Model, Role, Session};

#[derive(Debug, Clone, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub role: Role,
    pub timestamp: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireDocument {
    pub name: String,
    pub uploaded_at: String,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WireSession {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    pub system_prompt: String,
    pub model: String,
    #[serde(default)]
    pub document: Option<WireDocument>,
    pub created_at: String,
}

/// Accepts RFC 3339 or a naive ISO-8601 datetime, which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| ChatError::decode(format!("invalid timestamp '{}': {}", raw, e)))
}

impl TryFrom<WireMessage> for Message {
    type Error = ChatError;

    fn try_from(wire: WireMessage) -> Result<Self> {
        Ok(Message {
            timestamp: parse_timestamp(&wire.timestamp)?,
            id: wire.id,
            content: wire.content,
            role: wire.role,
            model: wire.model,
        })
    }
}

impl TryFrom<WireDocument> for Document {
    type Error = ChatError;

    fn try_from(wire: WireDocument) -> Result<Self> {
        Ok(Document {
            uploaded_at: parse_timestamp(&wire.uploaded_at)?,
            name: wire.name,
            size: wire.size.unwrap_or(0),
        })
    }
}

impl TryFrom<WireSession> for Session {
    type Error = ChatError;

    fn try_from(wire: WireSession) -> Result<Self> {
        let model = Model::from_str(&wire.model)
            .map_err(|_| ChatError::decode(format!("session {} has unknown model '{}'", wire.id, wire.model)))?;
        let document = wire.document.map(Document::try_from).transpose()?;

        let mut session = Session {
            created_at: parse_timestamp(&wire.created_at)?,
            id: wire.id,
            title: wire.title,
            messages: Vec::with_capacity(wire.messages.len()),
            system_prompt: wire.system_prompt,
            model,
            document,
        };
        // The server stamps a reply before the prompt it answers.
        for message in wire.messages {
            session.add_message(Message::try_from(message)?);
        }
        Ok(session)
    }
}
