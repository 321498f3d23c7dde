use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::GenerationStatus;

/// Title given to a session before its first message
pub const DEFAULT_SESSION_TITLE: &str = "New Chat";

/// Leading characters of the first message kept in a session title
pub const TITLE_MAX_CHARS: usize = 30;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One chat entry
///
/// Assistant placeholders are created with `status = Submitted` and later
/// updated in place, so their `id` is stable for the whole lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique across the whole store
    pub id: String,
    pub role: Role,
    pub content: String,
    /// URL of the generated image, once completed
    pub image_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Model the generation was requested from
    pub model_id: Option<String>,
    /// Remote request id, once the submission was acknowledged
    pub request_id: Option<String>,
    /// Generation lifecycle status; `None` for user messages
    pub status: Option<GenerationStatus>,
    /// Bumped on cancellation; stale settlements carry an older value
    pub epoch: u64,
}

impl Message {
    pub(crate) fn user(id: String, content: impl Into<String>) -> Self {
        Self {
            id,
            role: Role::User,
            content: content.into(),
            image_ref: None,
            timestamp: Utc::now(),
            model_id: None,
            request_id: None,
            status: None,
            epoch: 0,
        }
    }

    pub(crate) fn placeholder(id: String, model_id: &str) -> Self {
        Self {
            id,
            role: Role::Assistant,
            content: String::new(),
            image_ref: None,
            timestamp: Utc::now(),
            model_id: Some(model_id.to_string()),
            request_id: None,
            status: Some(GenerationStatus::Submitted),
            epoch: 0,
        }
    }

    /// True while the placeholder has not reached `completed` or `failed`
    pub fn is_pending(&self) -> bool {
        self.status.map_or(false, |s| !s.is_terminal())
    }
}

/// One independent conversation thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// Derived from the first user message, then fixed
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Append-ordered
    pub messages: Vec<Message>,
}

impl Session {
    pub(crate) fn new(id: String) -> Self {
        Self {
            id,
            title: DEFAULT_SESSION_TITLE.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub(crate) fn message_mut(&mut self, message_id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }
}

/// Builds a session title from its first message
///
/// Keeps the first 30 characters (not bytes) and appends `...`.
///
/// # Examples
///
/// ```
/// use fallab::conversation::title_from;
///
/// assert_eq!(title_from("a cat"), "a cat...");
/// assert_eq!(
///     title_from("a very long prompt about a cat sitting on a mat"),
///     "a very long prompt about a cat..."
/// );
/// ```
pub fn title_from(content: &str) -> String {
    let head: String = content.chars().take(TITLE_MAX_CHARS).collect();
    format!("{}...", head)
}
