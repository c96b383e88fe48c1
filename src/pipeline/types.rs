//! Shared types for the dispatch pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound message ─────────────────────────────────────────────────

/// One inbound message from the channel.
///
/// Transport adapters convert their native events into this struct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Channel-native unique ID (Matrix event ID).
    pub id: String,
    /// Sender identity (Matrix user ID).
    pub sender: String,
    /// Text payload. Empty when the event carried no usable body.
    pub body: String,
    /// Server timestamp, when the transport supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(id: impl Into<String>, sender: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            body: body.into(),
            sent_at: None,
        }
    }
}

// ── Task intent ─────────────────────────────────────────────────────

/// Kind of session a message asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Direct mention of this instance.
    Interactive,
    /// Explicit `/task` command.
    Task,
    /// Explicit `/research` command.
    Research,
    /// Topical keyword match.
    Philosophical,
    /// Fallback when no rule matched.
    General,
}

impl TaskType {
    /// Short label for logging and records.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Task => "task",
            Self::Research => "research",
            Self::Philosophical => "philosophical",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of classifying a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub task_type: TaskType,
    /// Body with the matched command prefix or mention token stripped.
    pub content: String,
}

impl Intent {
    pub fn new(task_type: TaskType, content: impl Into<String>) -> Self {
        Self {
            task_type,
            content: content.into(),
        }
    }
}
