//! Worker launcher: runs one session's worker process to completion.
//!
//! Provides:
//! - Output capture to a per-session log file (stdout and stderr interleaved)
//! - Null stdin, so a worker never waits on the dispatcher's terminal
//! - Exit code reporting (`None` when killed by a signal)

use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::WorkerError;
use crate::worker::state::SessionRecord;

/// Runs a worker for a session and reports its exit code.
#[async_trait]
pub trait WorkerRunner: Send + Sync {
    /// Launch the worker and wait for it to exit.
    ///
    /// `Ok(None)` means the worker ended without an exit code (signal).
    /// `Err` means it never started.
    async fn run(&self, session: &SessionRecord, prompt: &str) -> Result<Option<i32>, WorkerError>;
}

/// Launches an external command with the prompt as its final argument.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: String,
    args: Vec<String>,
}

impl ProcessRunner {
    /// Build from a command line: program followed by fixed arguments.
    pub fn from_command(command: &[String]) -> Result<Self, WorkerError> {
        let (program, args) = command.split_first().ok_or_else(|| WorkerError::SpawnFailed {
            program: String::new(),
            reason: "empty worker command".to_string(),
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

#[async_trait]
impl WorkerRunner for ProcessRunner {
    async fn run(&self, session: &SessionRecord, prompt: &str) -> Result<Option<i32>, WorkerError> {
        if let Some(parent) = session.log_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let stdout = tokio::fs::File::create(&session.log_path)
            .await?
            .into_std()
            .await;
        let stderr = stdout.try_clone()?;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg(prompt)
            .env("DISPATCH_SESSION_ID", &session.session_id)
            .env("DISPATCH_TASK_TYPE", session.task_type.label())
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr));

        let mut child = command.spawn().map_err(|e| WorkerError::SpawnFailed {
            program: self.program.clone(),
            reason: e.to_string(),
        })?;
        debug!(
            session_id = %session.session_id,
            pid = ?child.id(),
            "Worker process started"
        );

        let status = child.wait().await?;
        Ok(status.code())
    }
}
