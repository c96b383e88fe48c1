//! Poll loop: fetch → dedup → authorize → classify → spawn.
//!
//! The decision step (`plan`) is pure over `(state, batch)` so the whole
//! filtering pipeline can be tested without a transport or workers. The
//! async `Dispatcher` wraps it with I/O and the sleep between ticks.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channels::MessageSource;
use crate::error::ChannelError;
use crate::pipeline::auth::AuthorizationList;
use crate::pipeline::dedup::filter_new;
use crate::pipeline::rules::RulesEngine;
use crate::pipeline::types::{Intent, Message};
use crate::worker::SessionSpawner;

/// State owned and mutated only by the poll loop.
#[derive(Debug, Clone, Default)]
pub struct DispatcherState {
    /// ID of the newest message already accounted for.
    pub watermark: Option<String>,
    pub allow_list: AuthorizationList,
}

impl DispatcherState {
    pub fn new(allow_list: AuthorizationList) -> Self {
        Self {
            watermark: None,
            allow_list,
        }
    }

    pub fn with_watermark(mut self, watermark: impl Into<String>) -> Self {
        self.watermark = Some(watermark.into());
        self
    }
}

/// What happens to one new message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No usable text payload.
    EmptyBody,
    /// Sent by the dispatcher itself.
    SelfMessage,
    /// Sender not on the allow-list.
    Unauthorized,
    /// Authorized, but no trigger rule matched.
    Ignored,
    Dispatch(Intent),
}

#[derive(Debug, Clone)]
pub struct Decision {
    pub message: Message,
    pub outcome: Outcome,
}

/// Decide the fate of every new message in `batch` and advance the watermark.
///
/// Returns one decision per new message, oldest first. Every message in the
/// batch advances the watermark regardless of its outcome.
pub fn plan(state: &mut DispatcherState, batch: &[Message], rules: &RulesEngine) -> Vec<Decision> {
    let (fresh, watermark) = filter_new(batch, state.watermark.as_deref());
    state.watermark = watermark;

    fresh
        .into_iter()
        .map(|message| {
            let outcome = if message.body.trim().is_empty() {
                Outcome::EmptyBody
            } else if message.sender == rules.self_id() {
                Outcome::SelfMessage
            } else if !state.allow_list.authorize(&message.sender) {
                Outcome::Unauthorized
            } else {
                match rules.evaluate(&message.body) {
                    Some(intent) => Outcome::Dispatch(intent),
                    None => Outcome::Ignored,
                }
            };
            Decision { message, outcome }
        })
        .collect()
}

/// Timing and behaviour knobs for the poll loop.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub retry_delay: Duration,
    pub fetch_limit: usize,
    /// Post a one-line notice to the room when a session starts.
    pub announce: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry_delay: Duration::from_secs(10),
            fetch_limit: 10,
            announce: false,
        }
    }
}

/// The dispatcher process: one poll loop plus the sessions it spawns.
pub struct Dispatcher {
    source: Arc<dyn MessageSource>,
    rules: RulesEngine,
    spawner: SessionSpawner,
    state: DispatcherState,
    settings: PollSettings,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn MessageSource>,
        rules: RulesEngine,
        spawner: SessionSpawner,
        state: DispatcherState,
        settings: PollSettings,
    ) -> Self {
        Self {
            source,
            rules,
            spawner,
            state,
            settings,
        }
    }

    pub fn state(&self) -> &DispatcherState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut DispatcherState {
        &mut self.state
    }

    pub fn spawner(&self) -> &SessionSpawner {
        &self.spawner
    }

    /// Run one poll cycle. Returns the IDs of sessions spawned.
    ///
    /// On a fetch error nothing changes, including the watermark.
    pub async fn tick(&mut self) -> Result<Vec<String>, ChannelError> {
        let batch = self.source.fetch_recent(self.settings.fetch_limit).await?;
        let decisions = plan(&mut self.state, &batch, &self.rules);
        if !decisions.is_empty() {
            debug!(count = decisions.len(), "New messages");
        }

        let mut spawned = Vec::new();
        for Decision { message, outcome } in decisions {
            match outcome {
                Outcome::EmptyBody => {
                    debug!(message_id = %message.id, "Skipping message with no body");
                }
                Outcome::SelfMessage => {
                    debug!(message_id = %message.id, "Skipping own message");
                }
                Outcome::Unauthorized => {
                    warn!(
                        sender = %message.sender,
                        message_id = %message.id,
                        "Blocked message from unauthorized sender"
                    );
                }
                Outcome::Ignored => {
                    debug!(message_id = %message.id, "No trigger matched");
                }
                Outcome::Dispatch(intent) => {
                    let Some(session_id) = self
                        .spawner
                        .spawn(&intent, &message.sender, Some(&message.id))
                        .await
                    else {
                        continue;
                    };
                    if self.settings.announce {
                        self.announce(&session_id, &intent).await;
                    }
                    spawned.push(session_id);
                }
            }
        }
        Ok(spawned)
    }

    async fn announce(&self, session_id: &str, intent: &Intent) {
        let notice = format!("Started {} session {session_id}", intent.task_type);
        if let Err(e) = self.source.send(&notice).await {
            warn!(session_id = %session_id, "Failed to post session notice: {e}");
        }
    }

    /// Poll until `shutdown` fires, then wait for in-flight sessions.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            channel = %self.source.name(),
            interval_secs = self.settings.poll_interval.as_secs(),
            max_sessions = self.spawner.pool().max_sessions(),
            "Dispatcher started"
        );

        while !shutdown.is_cancelled() {
            let delay = match self.tick().await {
                Ok(_) => self.settings.poll_interval,
                Err(e) => {
                    error!("Fetch from {} failed: {e}", self.source.name());
                    self.settings.retry_delay
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        info!("Dispatcher stopping");
        self.spawner.drain().await;
        info!("All sessions finished");
    }
}
