//! Last-value-wins buffer with a scheduled flush.
//!
//! The owner pushes edits and polls with the current instant; nothing here spawns
//! timers, so the same value can be driven by a tokio loop or by tests that step
//! time by hand.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoalesceMode {
    /// Every push moves the deadline to `now + interval`.
    Debounce,
    /// The first push opens a window of `interval`; later pushes replace the value
    /// without moving the deadline.
    Throttle,
}

#[derive(Debug, Clone)]
pub struct Coalescer<T> {
    mode: CoalesceMode,
    interval: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
}

impl<T> Coalescer<T> {
    pub fn new(mode: CoalesceMode, interval: Duration) -> Self {
        Self {
            mode,
            interval,
            pending: None,
            deadline: None,
        }
    }

    pub fn debounce(interval: Duration) -> Self {
        Self::new(CoalesceMode::Debounce, interval)
    }

    pub fn throttle(interval: Duration) -> Self {
        Self::new(CoalesceMode::Throttle, interval)
    }

    /// Delivered on the next poll.
    pub fn immediate() -> Self {
        Self::new(CoalesceMode::Throttle, Duration::ZERO)
    }

    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some(value);
        match self.mode {
            CoalesceMode::Debounce => self.deadline = Some(now + self.interval),
            CoalesceMode::Throttle => {
                if self.deadline.is_none() {
                    self.deadline = Some(now + self.interval);
                }
            }
        }
    }

    /// Take the buffered value if its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.flush(),
            _ => None,
        }
    }

    /// Take the buffered value regardless of the deadline.
    pub fn flush(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
