//! Per-session sequence numbering for timeline messages.
//!
//! Every message appended to a transfer session gets the next value of the
//! session's [`SequenceCounter`].  The counter is owned by the session and is
//! independent of how many messages the timeline currently holds, so two
//! appends can never be handed the same id.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU64` internally, so presentation code holding a
//! shared reference can read [`SequenceCounter::last`] while the owner keeps
//! issuing ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing id source whose first id is 1.
///
/// # Examples
///
/// ```rust
/// use peerlink_core::protocol::SequenceCounter;
///
/// let counter = SequenceCounter::new();
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.next(), 2);
/// assert_eq!(counter.last(), 2);
/// ```
#[derive(Debug)]
pub struct SequenceCounter {
    /// The most recently issued id; 0 means none yet.
    last: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Issues the next id.
    ///
    /// Saturates at `u64::MAX` instead of wrapping back to already issued ids.
    pub fn next(&self) -> u64 {
        let previous = self
            .last
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_add(1))
            })
            .unwrap_or(u64::MAX);
        previous.saturating_add(1)
    }

    /// Returns the most recently issued id, or 0 if none was issued.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}
