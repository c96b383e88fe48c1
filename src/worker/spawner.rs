//! Session spawner: the record is written before the worker launches.
//!
//! Once a session's record exists, every later failure (launch error,
//! rejection, non-zero exit) shows up only as that session's terminal state.
//! If the record cannot be written, no session exists and `spawn` says so.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::pipeline::types::Intent;
use crate::store::RegistryHandle;
use crate::worker::pool::WorkerPool;
use crate::worker::prompt::PromptBuilder;
use crate::worker::runner::WorkerRunner;
use crate::worker::state::{SessionOutcome, SessionRecord, new_session_id};
use crate::workspace::ContextSource;

/// Everything the spawner needs.
pub struct SpawnerDeps {
    pub instance_id: String,
    pub sessions_dir: PathBuf,
    pub registry: RegistryHandle,
    pub runner: Arc<dyn WorkerRunner>,
    pub context: Arc<dyn ContextSource>,
    pub prompts: PromptBuilder,
    pub pool: WorkerPool,
}

/// Launches detached worker sessions and tracks their lifecycle.
pub struct SessionSpawner {
    deps: SpawnerDeps,
}

impl SessionSpawner {
    pub fn new(deps: SpawnerDeps) -> Self {
        Self { deps }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.deps.registry
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.deps.pool
    }

    /// Start a session for `intent`. Returns the new session ID, or `None`
    /// when its record could not be created and nothing was launched.
    pub async fn spawn(
        &self,
        intent: &Intent,
        sender: &str,
        message_id: Option<&str>,
    ) -> Option<String> {
        let session_id = new_session_id(&self.deps.instance_id, Utc::now());
        let log_path = self.deps.sessions_dir.join(format!("{session_id}.log"));

        let mut record = SessionRecord::new(
            &session_id,
            &self.deps.instance_id,
            intent.task_type,
            &intent.content,
            sender,
            log_path,
        );
        if let Some(id) = message_id {
            record = record.with_message_id(id);
        }

        let continuity = self.deps.context.snapshot().await;
        let prompt = self.deps.prompts.build(&record, &continuity);

        // The record must exist before the worker can possibly finish.
        if let Err(e) = self.deps.registry.create(record.clone()).await {
            error!(
                session_id = %session_id,
                "Session record not created, worker not launched: {e}"
            );
            return None;
        }

        let registry = self.deps.registry.clone();
        let runner = Arc::clone(&self.deps.runner);
        let job = async move {
            let outcome = match runner.run(&record, &prompt).await {
                Ok(code) => SessionOutcome::exited(code),
                Err(e) => {
                    warn!(session_id = %record.session_id, "Worker failed to launch: {e}");
                    SessionOutcome::failed(e.to_string())
                }
            };
            // Failure already logged by the registry.
            let _ = registry.complete(&record.session_id, outcome).await;
        };

        match self.deps.pool.submit(&session_id, job) {
            Ok(()) => {
                info!(
                    session_id = %session_id,
                    task_type = %intent.task_type,
                    sender = %sender,
                    "Session spawned"
                );
            }
            Err(e) => {
                warn!(session_id = %session_id, "Session rejected: {e}");
                let _ = self
                    .deps
                    .registry
                    .complete(&session_id, SessionOutcome::failed(format!("rejected: {e}")))
                    .await;
            }
        }

        Some(session_id)
    }

    /// Stop admitting sessions and wait for every in-flight one to record completion.
    pub async fn drain(&self) {
        let in_flight = self.deps.pool.in_flight();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight sessions to finish");
        }
        self.deps.pool.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use super::*;
    use crate::config::{AdmissionPolicy, instance_id};
    use crate::error::{RegistryError, WorkerError};
    use crate::pipeline::types::TaskType;
    use crate::store::{FileSessionStore, MemorySessionStore, SessionStore, spawn_registry};
    use crate::worker::state::SessionStatus;

    /// Stub runner: exits with a fixed code, optionally waiting for a release.
    struct StubRunner {
        code: Result<Option<i32>, String>,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl WorkerRunner for StubRunner {
        async fn run(
            &self,
            _session: &SessionRecord,
            _prompt: &str,
        ) -> Result<Option<i32>, WorkerError> {
            if let Some(ref gate) = self.gate {
                gate.notified().await;
            }
            self.code.clone().map_err(|reason| WorkerError::SpawnFailed {
                program: "stub".into(),
                reason,
            })
        }
    }

    struct NoContext;

    #[async_trait]
    impl ContextSource for NoContext {
        async fn snapshot(&self) -> String {
            String::new()
        }
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    #[async_trait]
    impl SessionStore for BrokenStore {
        async fn insert(&mut self, _record: &SessionRecord) -> Result<(), RegistryError> {
            Err(RegistryError::Io(std::io::Error::other("disk full")))
        }
        async fn update(&mut self, _record: &SessionRecord) -> Result<(), RegistryError> {
            Err(RegistryError::Io(std::io::Error::other("disk full")))
        }
        async fn get(&self, _session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
            Ok(None)
        }
        async fn list(&self) -> Result<Vec<SessionRecord>, RegistryError> {
            Ok(Vec::new())
        }
    }

    fn spawner(runner: StubRunner, pool: WorkerPool) -> SessionSpawner {
        spawner_with(MemorySessionStore::new(), "aria", runner, pool)
    }

    fn spawner_with<S: SessionStore + 'static>(
        store: S,
        instance_id: &str,
        runner: StubRunner,
        pool: WorkerPool,
    ) -> SessionSpawner {
        let (registry, _task) = spawn_registry(store);
        SessionSpawner::new(SpawnerDeps {
            instance_id: instance_id.into(),
            sessions_dir: PathBuf::from("/tmp/sessions"),
            registry,
            runner: Arc::new(runner),
            context: Arc::new(NoContext),
            prompts: PromptBuilder::new("Aria", "!r:m.org"),
            pool,
        })
    }

    fn intent() -> Intent {
        Intent::new(TaskType::Task, "summarize the log")
    }

    #[tokio::test]
    async fn successful_worker_completes_session() {
        let spawner = spawner(
            StubRunner { code: Ok(Some(0)), gate: None },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", Some("$e2")).await.unwrap();
        spawner.drain().await;

        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Completed);
        assert_eq!(rec.exit_code, Some(0));
        assert_eq!(rec.task_content, "summarize the log");
        assert_eq!(rec.message_id.as_deref(), Some("$e2"));
        assert_eq!(rec.log_path, PathBuf::from(format!("/tmp/sessions/{id}.log")));
    }

    #[tokio::test]
    async fn nonzero_exit_fails_session() {
        let spawner = spawner(
            StubRunner { code: Ok(Some(1)), gate: None },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();
        spawner.drain().await;

        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Failed);
        assert_eq!(rec.exit_code, Some(1));
    }

    #[tokio::test]
    async fn launch_failure_fails_session() {
        let spawner = spawner(
            StubRunner { code: Err("no such file".into()), gate: None },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();
        spawner.drain().await;

        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Failed);
        assert!(rec.exit_code.is_none());
        assert!(rec.failure_reason.unwrap().contains("no such file"));
    }

    #[tokio::test]
    async fn record_is_running_before_worker_finishes() {
        let gate = Arc::new(Notify::new());
        let spawner = spawner(
            StubRunner { code: Ok(Some(0)), gate: Some(Arc::clone(&gate)) },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();

        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Running);

        gate.notify_one();
        spawner.drain().await;
        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn rejected_session_is_recorded_failed() {
        let gate = Arc::new(Notify::new());
        let spawner = spawner(
            StubRunner { code: Ok(Some(0)), gate: Some(Arc::clone(&gate)) },
            WorkerPool::new(1, AdmissionPolicy::Reject),
        );
        let first = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();
        let second = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();

        let rejected = spawner.registry().get(&second).await.unwrap().unwrap();
        assert_eq!(rejected.status, SessionStatus::Failed);
        assert!(rejected.failure_reason.unwrap().starts_with("rejected"));

        gate.notify_one();
        spawner.drain().await;
        let rec = spawner.registry().get(&first).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn rapid_spawns_get_unique_ids() {
        let spawner = spawner(
            StubRunner { code: Ok(Some(0)), gate: None },
            WorkerPool::new(4, AdmissionPolicy::Queue),
        );
        let mut ids = HashSet::new();
        for _ in 0..20 {
            ids.insert(spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap());
        }
        spawner.drain().await;
        assert_eq!(ids.len(), 20);

        let records = spawner.registry().list().await.unwrap();
        assert_eq!(records.len(), 20);
        assert!(records.iter().all(|r| r.status == SessionStatus::Completed));
    }

    #[tokio::test]
    async fn failed_record_write_launches_nothing() {
        let spawner = spawner_with(
            BrokenStore,
            "aria",
            StubRunner { code: Ok(Some(0)), gate: None },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", None).await;
        assert!(id.is_none());
        assert_eq!(spawner.pool().in_flight(), 0);
    }

    #[tokio::test]
    async fn path_characters_in_instance_name_still_get_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();
        let spawner = spawner_with(
            store,
            &instance_id("Aria/Nova ../x"),
            StubRunner { code: Ok(Some(0)), gate: None },
            WorkerPool::new(2, AdmissionPolicy::Queue),
        );
        let id = spawner.spawn(&intent(), "@thomas:matrix.org", None).await.unwrap();
        spawner.drain().await;

        assert!(id.starts_with("aria-nova-x-"));
        assert!(dir.path().join(format!("{id}.json")).exists());
        let rec = spawner.registry().get(&id).await.unwrap().unwrap();
        assert_eq!(rec.status, SessionStatus::Completed);
        assert_eq!(spawner.registry().list().await.unwrap().len(), 1);
    }
}
