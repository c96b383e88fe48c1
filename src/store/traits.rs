//! `SessionStore` trait: durable keyed record set, one record per session.
//!
//! A store is owned by exactly one registry task, so mutating methods take
//! `&mut self`. Records are never deleted here; retention is someone else's job.

use async_trait::async_trait;

use crate::error::RegistryError;
use crate::worker::state::SessionRecord;

/// Backend-agnostic session record storage.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new record. Fails if the ID already exists.
    async fn insert(&mut self, record: &SessionRecord) -> Result<(), RegistryError>;

    /// Overwrite an existing record. Fails if the ID is unknown.
    async fn update(&mut self, record: &SessionRecord) -> Result<(), RegistryError>;

    /// Get a record by session ID.
    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, RegistryError>;

    /// All records, oldest first.
    async fn list(&self) -> Result<Vec<SessionRecord>, RegistryError>;
}
