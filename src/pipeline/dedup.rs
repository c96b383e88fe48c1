//! Watermark-based deduplication over a bounded fetch window.
//!
//! The transport returns the newest `limit` messages, newest-first. The
//! watermark is the ID of the last message already accounted for. Anything
//! at or before it in chronological order has been seen; anything after is new.
//!
//! If the watermark has scrolled out of the window, every message in the batch
//! is treated as new. Re-delivery after a long outage is the accepted cost of
//! keeping no state beyond one ID.

use crate::pipeline::types::Message;

/// Split a newest-first batch into the unseen messages (oldest-first) and the
/// advanced watermark.
///
/// The new watermark is the newest message in the batch, whether or not that
/// message will be dispatched. An empty batch leaves the watermark unchanged.
pub fn filter_new(batch: &[Message], watermark: Option<&str>) -> (Vec<Message>, Option<String>) {
    let chronological: Vec<&Message> = batch.iter().rev().collect();

    let start = match watermark.filter(|w| !w.is_empty()) {
        Some(w) => chronological
            .iter()
            .position(|m| m.id == w)
            .map(|idx| idx + 1)
            .unwrap_or(0),
        None => 0,
    };

    let fresh: Vec<Message> = chronological[start..].iter().map(|m| (*m).clone()).collect();

    let next = chronological
        .last()
        .map(|m| m.id.clone())
        .or_else(|| watermark.map(String::from));

    (fresh, next)
}
