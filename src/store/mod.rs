//! Persistence layer: session lifecycle records.

pub mod registry;
pub mod sessions;
pub mod traits;

pub use registry::{RegistryHandle, spawn_registry};
pub use sessions::{FileSessionStore, MemorySessionStore};
pub use traits::SessionStore;
