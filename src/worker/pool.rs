//! Bounded worker pool with admission control.
//!
//! At most `max_sessions` workers run at once. Beyond that the admission
//! policy decides: `Queue` parks the session until a slot frees up (inside
//! its own task, so the poll loop never waits), `Reject` turns it away.
//! Every admitted task is tracked so shutdown can wait for all of them.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::config::AdmissionPolicy;
use crate::error::WorkerError;

/// Bounded, tracked set of session tasks.
#[derive(Clone)]
pub struct WorkerPool {
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    max_sessions: usize,
    policy: AdmissionPolicy,
}

impl WorkerPool {
    pub fn new(max_sessions: usize, policy: AdmissionPolicy) -> Self {
        let max_sessions = max_sessions.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_sessions)),
            tracker: TaskTracker::new(),
            max_sessions,
            policy,
        }
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Number of workers currently holding a slot.
    pub fn running(&self) -> usize {
        self.max_sessions - self.slots.available_permits()
    }

    /// Number of admitted tasks not yet finished (running plus queued).
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Admit a session task.
    ///
    /// `job` runs once a slot is held. Under `Reject` with no free slot the job
    /// is dropped unrun and `WorkerError::Rejected` is returned.
    pub fn submit<F>(&self, session_id: &str, job: F) -> Result<(), WorkerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.policy {
            AdmissionPolicy::Reject => {
                let permit = Arc::clone(&self.slots)
                    .try_acquire_owned()
                    .map_err(|_| WorkerError::Rejected {
                        max: self.max_sessions,
                    })?;
                self.tracker.spawn(run_with_permit(permit, job));
            }
            AdmissionPolicy::Queue => {
                let slots = Arc::clone(&self.slots);
                let session_id = session_id.to_string();
                self.tracker.spawn(async move {
                    if slots.available_permits() == 0 {
                        debug!(session_id = %session_id, "Worker pool full, session queued");
                    }
                    // The semaphore is never closed, so acquire cannot fail.
                    if let Ok(permit) = slots.acquire_owned().await {
                        run_with_permit(permit, job).await;
                    }
                });
            }
        }
        Ok(())
    }

    /// Stop admitting and wait for every admitted session to finish.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_with_permit<F>(permit: OwnedSemaphorePermit, job: F)
where
    F: Future<Output = ()>,
{
    job.await;
    drop(permit);
}
