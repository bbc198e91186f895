//! Bounded polling on an injectable clock.

use std::cell::Cell;
use std::time::{Duration, Instant};

/// Time source for waits.
pub trait Clock {
    /// Monotonic time since an arbitrary origin.
    fn now(&self) -> Duration;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual time: `sleep` advances the clock instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        self.now.set(self.now.get() + duration);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("condition not met within {timeout:?}")]
pub struct PollTimeout {
    pub timeout: Duration,
}

/// Evaluate `predicate` every `interval` until it holds or `timeout` passes.
///
/// The predicate is always evaluated at least once, and once more at the
/// deadline.
///
/// # Errors
///
/// Returns [`PollTimeout`] if the predicate never held.
pub fn poll_until<C, F>(
    clock: &C,
    interval: Duration,
    timeout: Duration,
    mut predicate: F,
) -> Result<(), PollTimeout>
where
    C: Clock + ?Sized,
    F: FnMut() -> bool,
{
    let start = clock.now();
    loop {
        if predicate() {
            return Ok(());
        }
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            return Err(PollTimeout { timeout });
        }
        clock.sleep(interval.min(timeout - elapsed));
    }
}
