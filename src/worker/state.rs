//! Session state machine and lifecycle record.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::pipeline::types::TaskType;

/// Process-wide spawn counter; keeps same-second session IDs distinct.
static SESSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a unique session ID: `{instance}-{YYYYmmdd-HHMMSS}-{pid}-{seq}`.
pub fn new_session_id(instance_id: &str, now: DateTime<Utc>) -> String {
    let seq = SESSION_SEQ.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}-{}-{}-{}",
        instance_id,
        now.format("%Y%m%d-%H%M%S"),
        std::process::id(),
        seq
    )
}

/// Status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Worker launched (or queued) and has not reported back.
    Running,
    /// Worker exited with status 0.
    Completed,
    /// Worker exited non-zero, was killed, failed to launch, or was rejected.
    Failed,
}

impl SessionStatus {
    /// Only `Running` may move, and only to a terminal state.
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!(
            (self, target),
            (Self::Running, Self::Completed) | (Self::Running, Self::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// How a worker ended, as reported by its completion handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    /// Process exit code. `None` when killed by a signal or never launched.
    pub exit_code: Option<i32>,
    /// Set when the worker never ran to an exit code.
    pub failure_reason: Option<String>,
}

impl SessionOutcome {
    pub fn exited(code: Option<i32>) -> Self {
        Self {
            exit_code: code,
            failure_reason: code.is_none().then(|| "terminated by signal".to_string()),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            failure_reason: Some(reason.into()),
        }
    }

    /// `completed` iff the worker exited with the success code.
    pub fn status(&self) -> SessionStatus {
        if self.exit_code == Some(0) && self.failure_reason.is_none() {
            SessionStatus::Completed
        } else {
            SessionStatus::Failed
        }
    }
}

/// Persisted lifecycle record for one spawned session.
///
/// Spawn-time fields never change. Completion fields are written exactly
/// once, by the session's own completion handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub instance: String,
    pub task_type: TaskType,
    pub task_content: String,
    pub sender: String,
    /// Channel message that triggered this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub log_path: PathBuf,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SessionRecord {
    /// Create a running record.
    pub fn new(
        session_id: impl Into<String>,
        instance: impl Into<String>,
        task_type: TaskType,
        task_content: impl Into<String>,
        sender: impl Into<String>,
        log_path: PathBuf,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            instance: instance.into(),
            task_type,
            task_content: task_content.into(),
            sender: sender.into(),
            message_id: None,
            started_at: Utc::now(),
            log_path,
            status: SessionStatus::Running,
            completed_at: None,
            exit_code: None,
            failure_reason: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// Record the terminal state. Fails if the session already completed.
    pub fn complete(&mut self, outcome: &SessionOutcome) -> Result<(), RegistryError> {
        let target = outcome.status();
        if !self.status.can_transition_to(target) {
            return Err(RegistryError::AlreadyCompleted {
                session_id: self.session_id.clone(),
            });
        }
        self.status = target;
        self.completed_at = Some(Utc::now());
        self.exit_code = outcome.exit_code;
        self.failure_reason = outcome.failure_reason.clone();
        Ok(())
    }
}
