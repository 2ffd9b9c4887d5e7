use std::path::Path;
use std::sync::Arc;

use chrono::Utc;

use crate::backend::ChatBackend;
use crate::error::{Result, ValidationError};
use crate::session::Document;
use crate::store::{Notification, SessionStore};

pub const ALLOWED_MIME_TYPES: [&str; 3] = [
    "application/pdf",
    "text/plain",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Matches the backend's own upload limit.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    /// Reads a local file, guessing its type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        log::debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), mime);
        Ok(Self::new(name, mime.essence_str(), bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_allowed_type(&self) -> bool {
        ALLOWED_MIME_TYPES.contains(&self.mime.as_str())
    }
}

/// Tracks the one document a session may have attached.
pub struct DocumentAttachment {
    store: Arc<SessionStore>,
    backend: Arc<dyn ChatBackend>,
    max_upload_bytes: u64,
}

impl DocumentAttachment {
    pub fn new(store: Arc<SessionStore>, backend: Arc<dyn ChatBackend>, max_upload_bytes: u64) -> Self {
        Self {
            store,
            backend,
            max_upload_bytes,
        }
    }

    fn validate(&self, file: &UploadFile, session_id: &str) -> Result<(), ValidationError> {
        if !self.store.contains(session_id) {
            return Err(ValidationError::UnknownSession(session_id.to_string()));
        }
        if !file.is_allowed_type() {
            return Err(ValidationError::DisallowedFileType(file.mime.clone()));
        }
        if file.size() > self.max_upload_bytes {
            return Err(ValidationError::FileTooLarge {
                size: file.size(),
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    pub async fn attach(&self, file: UploadFile, session_id: &str) -> Result<Document> {
        if let Err(invalid) = self.validate(&file, session_id) {
            log::warn!("Rejected upload of {}: {}", file.name, invalid);
            match &invalid {
                ValidationError::DisallowedFileType(_) => self
                    .store
                    .notify(Notification::error("Invalid file type", "Please upload PDF, TXT, or DOCX files only")),
                ValidationError::FileTooLarge { .. } => {
                    self.store.notify(Notification::error("File too large", invalid.to_string()))
                }
                _ => {}
            }
            return Err(invalid.into());
        }

        let result = {
            let _loading = self.store.begin_request();
            self.backend.upload_document(&file, session_id).await
        };

        match result {
            Ok(ack) => {
                let document = Document {
                    name: file.name.clone(),
                    uploaded_at: Utc::now(),
                    size: file.size(),
                };
                // The session id was captured before the upload; the user may have moved on since.
                self.store.set_document(session_id, document.clone())?;
                log::info!("Attached {} to session {}", document.name, session_id);
                self.store.notify(Notification::info("Document uploaded", ack.message));
                Ok(document)
            }
            Err(e) => {
                log::error!("Upload of {} for session {} failed: {}", file.name, session_id, e);
                self.store.notify(Notification::error("Upload failed", "Failed to upload document"));
                Err(e)
            }
        }
    }

    pub fn detach(&self, session_id: &str) -> Option<Document> {
        let removed = self.store.clear_document(session_id);
        if let Some(doc) = &removed {
            log::info!("Detached {} from session {}", doc.name, session_id);
        }
        removed
    }

    pub fn has_document(&self, session_id: &str) -> bool {
        self.store.session(session_id).map_or(false, |s| s.has_document())
    }

    pub fn document(&self, session_id: &str) -> Option<Document> {
        self.store.session(session_id).and_then(|s| s.document)
    }
}
