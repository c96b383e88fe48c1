//! Session registry: single-writer task in front of a `SessionStore`.
//!
//! The dispatch loop creates records and worker completion handlers finish
//! them, often at the same moment. Every write goes through one channel into
//! one task that owns the store, so writes never interleave.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::store::traits::SessionStore;
use crate::worker::state::{SessionOutcome, SessionRecord};

/// Command queue depth.
const REGISTRY_QUEUE: usize = 256;

type Reply<T> = oneshot::Sender<Result<T, RegistryError>>;

enum Command {
    Create {
        record: Box<SessionRecord>,
        reply: Reply<()>,
    },
    Complete {
        session_id: String,
        outcome: SessionOutcome,
        reply: Reply<SessionRecord>,
    },
    Get {
        session_id: String,
        reply: Reply<Option<SessionRecord>>,
    },
    List {
        reply: Reply<Vec<SessionRecord>>,
    },
}

/// Cloneable handle to the registry task.
///
/// The task exits once every handle has been dropped and the queue is drained.
#[derive(Clone)]
pub struct RegistryHandle {
    tx: mpsc::Sender<Command>,
}

impl RegistryHandle {
    /// Persist a new running session.
    pub async fn create(&self, record: SessionRecord) -> Result<(), RegistryError> {
        self.request(|reply| Command::Create {
            record: Box::new(record),
            reply,
        })
        .await
    }

    /// Write the terminal state for a session. Returns the finished record.
    pub async fn complete(
        &self,
        session_id: &str,
        outcome: SessionOutcome,
    ) -> Result<SessionRecord, RegistryError> {
        self.request(|reply| Command::Complete {
            session_id: session_id.to_string(),
            outcome,
            reply,
        })
        .await
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError> {
        self.request(|reply| Command::Get {
            session_id: session_id.to_string(),
            reply,
        })
        .await
    }

    pub async fn list(&self) -> Result<Vec<SessionRecord>, RegistryError> {
        self.request(|reply| Command::List { reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T, RegistryError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| RegistryError::Closed)?;
        rx.await.map_err(|_| RegistryError::Closed)?
    }
}

/// Spawn the registry task over `store`.
pub fn spawn_registry<S>(store: S) -> (RegistryHandle, JoinHandle<()>)
where
    S: SessionStore + 'static,
{
    let (tx, rx) = mpsc::channel(REGISTRY_QUEUE);
    let handle = tokio::spawn(run_registry(store, rx));
    (RegistryHandle { tx }, handle)
}

async fn run_registry<S: SessionStore>(mut store: S, mut rx: mpsc::Receiver<Command>) {
    debug!("Session registry started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            Command::Create { record, reply } => {
                let result = store.insert(&record).await;
                if let Err(ref e) = result {
                    warn!(session_id = %record.session_id, "Failed to create session record: {e}");
                }
                let _ = reply.send(result);
            }
            Command::Complete {
                session_id,
                outcome,
                reply,
            } => {
                let result = complete(&mut store, &session_id, &outcome).await;
                match &result {
                    Ok(record) => info!(
                        session_id = %session_id,
                        status = %record.status,
                        exit_code = ?record.exit_code,
                        "Session finished"
                    ),
                    Err(e) => warn!(session_id = %session_id, "Failed to complete session: {e}"),
                }
                let _ = reply.send(result);
            }
            Command::Get { session_id, reply } => {
                let _ = reply.send(store.get(&session_id).await);
            }
            Command::List { reply } => {
                let _ = reply.send(store.list().await);
            }
        }
    }

    debug!("Session registry stopped");
}

/// Read the authoritative record, apply the outcome, write it back.
async fn complete<S: SessionStore>(
    store: &mut S,
    session_id: &str,
    outcome: &SessionOutcome,
) -> Result<SessionRecord, RegistryError> {
    let mut record = store
        .get(session_id)
        .await?
        .ok_or_else(|| RegistryError::NotFound {
            session_id: session_id.to_string(),
        })?;
    record.complete(outcome)?;
    store.update(&record).await?;
    Ok(record)
}
