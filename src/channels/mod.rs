//! Transport boundary: fetch and send text messages on the shared channel.
//!
//! Adapters are pure I/O: no dedup, authorization, or classification. Those
//! live in `pipeline`.

pub mod matrix;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::pipeline::types::Message;

pub use matrix::MatrixChannel;

/// A channel the dispatcher can poll and post to.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Channel name (e.g. "matrix").
    fn name(&self) -> &str;

    /// Fetch up to `limit` of the most recent messages, newest-first.
    ///
    /// Must have no side effects on failure.
    async fn fetch_recent(&self, limit: usize) -> Result<Vec<Message>, ChannelError>;

    /// Post a text message. Returns the channel-native message ID.
    async fn send(&self, text: &str) -> Result<String, ChannelError>;

    /// Validate credentials. Returns the identity the channel knows us as.
    async fn whoami(&self) -> Result<String, ChannelError>;
}
