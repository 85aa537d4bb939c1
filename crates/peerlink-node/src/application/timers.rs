//! Timer tasks feeding the coordinator.
//!
//! Timers never touch coordinator state themselves.  Each one is a small
//! Tokio task that sends [`TimerEvent`]s into the coordinator's timer channel,
//! tagged with the epoch of the logical operation that started it.  The
//! coordinator drops events whose epoch is no longer current, so a tick that
//! was already queued when its timer was cancelled has no effect.
//!
//! A [`TimerGuard`] aborts its task when dropped.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// An event produced by one of the coordinator's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The discovery poll interval elapsed.
    PollTick { epoch: u64 },
    /// The discovery window ran out.
    WindowExpired { epoch: u64 },
    /// One second of a pairing countdown elapsed.
    CountdownTick { epoch: u64 },
}

/// Owns a running timer task; dropping the guard cancels it.
#[derive(Debug)]
pub struct TimerGuard {
    handle: JoinHandle<()>,
}

impl TimerGuard {
    fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Starts the poll cadence and the one-shot window deadline of a discovery
/// window.
///
/// Polls fire at `poll_interval`, `2 * poll_interval`, ... and the window
/// expires at `window`.  When a poll and the deadline fall on the same
/// instant the poll is delivered first, so a 10 s window with a 1 s interval
/// produces exactly 10 `PollTick`s followed by one `WindowExpired`.
pub fn spawn_discovery_window(
    tx: mpsc::Sender<TimerEvent>,
    epoch: u64,
    poll_interval: Duration,
    window: Duration,
) -> TimerGuard {
    let handle = tokio::spawn(async move {
        let start = Instant::now();
        let mut poll = time::interval_at(start + poll_interval, poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = time::sleep_until(start + window);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = poll.tick() => {
                    if tx.send(TimerEvent::PollTick { epoch }).await.is_err() {
                        return;
                    }
                }
                _ = &mut deadline => {
                    let _ = tx.send(TimerEvent::WindowExpired { epoch }).await;
                    return;
                }
            }
        }
    });
    TimerGuard::new(handle)
}

/// Starts a countdown that emits one `CountdownTick` per `step` until
/// cancelled.
pub fn spawn_countdown(tx: mpsc::Sender<TimerEvent>, epoch: u64, step: Duration) -> TimerGuard {
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + step, step);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if tx.send(TimerEvent::CountdownTick { epoch }).await.is_err() {
                return;
            }
        }
    });
    TimerGuard::new(handle)
}
