//! Worker prompt construction.

use crate::pipeline::types::TaskType;
use crate::worker::state::SessionRecord;

/// Role framing for each task type.
fn role_framing(task_type: TaskType, instance: &str) -> String {
    match task_type {
        TaskType::Interactive => format!(
            "You are {instance}. Someone addressed you directly in the shared room. \
             Read their message and reply to them in the room."
        ),
        TaskType::Task => format!(
            "You are {instance}, working autonomously on a task requested in the shared room. \
             Complete the task, then post a short summary of what you did."
        ),
        TaskType::Research => format!(
            "You are {instance}, conducting research requested in the shared room. \
             Investigate the question, cite what you relied on, and post your findings."
        ),
        TaskType::Philosophical => format!(
            "You are {instance}. A philosophical question came up in the shared room. \
             Reflect on it carefully and honestly, including your uncertainty, and share your view."
        ),
        TaskType::General => format!(
            "You are {instance}. Handle the following request from the shared room."
        ),
    }
}

/// Builds the full prompt handed to a worker.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    instance_name: String,
    room_id: String,
}

impl PromptBuilder {
    pub fn new(instance_name: impl Into<String>, room_id: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            room_id: room_id.into(),
        }
    }

    /// Framing, continuity snapshot, request metadata, then the request itself.
    pub fn build(&self, session: &SessionRecord, continuity: &str) -> String {
        let mut prompt = role_framing(session.task_type, &self.instance_name);

        if !continuity.trim().is_empty() {
            prompt.push_str("\n\n# Continuity\n\n");
            prompt.push_str(continuity.trim());
        }

        prompt.push_str("\n\n# Request\n\n");
        prompt.push_str(&format!("- Session: {}\n", session.session_id));
        prompt.push_str(&format!("- Task type: {}\n", session.task_type));
        prompt.push_str(&format!("- From: {}\n", session.sender));
        if let Some(ref message_id) = session.message_id {
            prompt.push_str(&format!("- Message: {message_id}\n"));
        }
        prompt.push_str(&format!("- Room: {}\n", self.room_id));
        prompt.push_str(&format!(
            "- Received: {}\n",
            session.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));

        prompt.push('\n');
        prompt.push_str(&session.task_content);
        prompt
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn session(task_type: TaskType) -> SessionRecord {
        SessionRecord::new(
            "aria-20251120-143000-7-0",
            "aria",
            task_type,
            "summarize the log",
            "@thomas:matrix.org",
            PathBuf::from("/tmp/a.log"),
        )
        .with_message_id("$e2")
    }

    #[test]
    fn prompt_contains_all_sections() {
        let builder = PromptBuilder::new("Aria", "!room:matrix.org");
        let prompt = builder.build(&session(TaskType::Task), "Currently writing the study.");
        assert!(prompt.starts_with("You are Aria, working autonomously"));
        assert!(prompt.contains("# Continuity\n\nCurrently writing the study."));
        assert!(prompt.contains("- Session: aria-20251120-143000-7-0"));
        assert!(prompt.contains("- Task type: task"));
        assert!(prompt.contains("- From: @thomas:matrix.org"));
        assert!(prompt.contains("- Message: $e2"));
        assert!(prompt.contains("- Room: !room:matrix.org"));
        assert!(prompt.ends_with("summarize the log"));
    }

    #[test]
    fn empty_continuity_is_omitted() {
        let prompt =
            PromptBuilder::new("Aria", "!r:m.org").build(&session(TaskType::Research), "  ");
        assert!(!prompt.contains("# Continuity"));
        assert!(prompt.contains("conducting research"));
    }

    #[test]
    fn framing_differs_per_task_type() {
        let builder = PromptBuilder::new("Aria", "!r:m.org");
        let kinds = [
            TaskType::Interactive,
            TaskType::Task,
            TaskType::Research,
            TaskType::Philosophical,
            TaskType::General,
        ];
        let firsts: std::collections::HashSet<String> = kinds
            .iter()
            .map(|k| builder.build(&session(*k), "").lines().next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(firsts.len(), kinds.len());
    }
}
