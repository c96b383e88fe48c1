//! Room Dispatch: polls a shared chat room and turns requests into worker sessions.

pub mod channels;
pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod worker;
pub mod workspace;
