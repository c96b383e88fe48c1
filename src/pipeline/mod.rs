//! Message dispatch pipeline.
//!
//! Every polled batch flows through:
//! 1. `dedup::filter_new()`: drop what the watermark already covers
//! 2. `AuthorizationList::authorize()`: allow-list gate (self-messages rejected first)
//! 3. `RulesEngine::evaluate()`: ordered trigger/classify rule table
//! 4. `SessionSpawner::spawn()`: one worker session per dispatched message
//!
//! Steps 1-3 are pure (`dispatcher::plan`); only the fetch and spawn do I/O.

pub mod auth;
pub mod dedup;
pub mod dispatcher;
pub mod rules;
pub mod types;

pub use auth::AuthorizationList;
pub use dispatcher::{Decision, Dispatcher, DispatcherState, Outcome, PollSettings, plan};
pub use rules::RulesEngine;
pub use types::{Intent, Message, TaskType};
