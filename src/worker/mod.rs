//! Worker sessions: one detached worker per dispatched message.
//!
//! Core components:
//! - `state`: session record and lifecycle (running → completed/failed)
//! - `prompt`: prompt construction from task type, continuity and metadata
//! - `runner`: launches the worker process and captures its output
//! - `pool`: bounded concurrency with queue/reject admission
//! - `spawner`: ties the above to the session registry

pub mod pool;
pub mod prompt;
pub mod runner;
pub mod spawner;
pub mod state;

pub use pool::WorkerPool;
pub use prompt::PromptBuilder;
pub use runner::{ProcessRunner, WorkerRunner};
pub use spawner::{SessionSpawner, SpawnerDeps};
pub use state::{SessionOutcome, SessionRecord, SessionStatus, new_session_id};
