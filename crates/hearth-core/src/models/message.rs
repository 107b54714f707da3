use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest message body the server accepts.
pub const MAX_MESSAGE_LENGTH: usize = 1000;

/// A post on the message wall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: i64,
    pub content: String,
    /// Server timestamps are naive UTC
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub sender_username: String,
}

impl Message {
    pub fn created_at_utc(&self) -> DateTime<Utc> {
        self.created_at.and_utc()
    }

    /// Short local timestamp for list display
    pub fn display_time(&self) -> String {
        self.created_at_utc()
            .with_timezone(&chrono::Local)
            .format("%m-%d %H:%M")
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageCreate {
    pub content: String,
}

impl MessageCreate {
    /// Trim and validate a message body against the server's limits.
    pub fn new(content: &str) -> Option<Self> {
        let content = content.trim();
        if content.is_empty() || content.chars().count() > MAX_MESSAGE_LENGTH {
            return None;
        }
        Some(Self {
            content: content.to_string(),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnreadCount {
    pub unread: u64,
}
