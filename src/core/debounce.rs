//! Debouncer - a cancellable, re-armable deadline.
//!
//! Used to hold the "generating" flag up for a short while after a batch
//! finishes, so a fast 100% is still visible before it disappears:
//! 1. Arm when the batch reaches completion (re-arming resets the timer)
//! 2. Cancel when a new batch starts
//! 3. Observers call `tick()` and flip the flag once the deadline passes

use std::time::{Duration, Instant};

/// Deadline-based debouncer.
///
/// # Usage
/// ```ignore
/// // On completion:
/// debouncer.schedule();
///
/// // In update loop:
/// if debouncer.tick() {
///     active = false;
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Debouncer {
    /// Delay between the last schedule() and the trigger
    delay: Duration,
    /// Pending trigger time
    pending: Option<Instant>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(500),
            pending: None,
        }
    }
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, pending: None }
    }

    /// Arm the trigger. If already pending, resets the timer instead of
    /// stacking a second trigger.
    pub fn schedule(&mut self) {
        if self.pending.is_some() {
            log::trace!("Debouncer: re-armed ({}ms)", self.delay.as_millis());
        }
        self.pending = Some(Instant::now() + self.delay);
    }

    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            log::trace!("Debouncer: cancelled pending trigger");
        }
    }

    /// Returns true exactly once when the deadline has passed.
    pub fn tick(&mut self) -> bool {
        let Some(trigger_at) = self.pending else {
            return false;
        };

        if Instant::now() >= trigger_at {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
