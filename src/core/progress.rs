//! Progress tracker - aggregate counters for a caller-declared batch.
//!
//! `total` is bumped by the caller before issuing requests, `completed` by the
//! scheduler on every settlement. Duplicate requests that join an in-flight
//! job count towards `total` but settle only once, so `completed` can stay
//! below `total` for a batch with repeated keys.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info};

use super::debounce::Debouncer;

/// Read-only view for UI layers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub completed: u64,
    pub active: bool,
}

impl ProgressSnapshot {
    /// Completion in 0.0..=1.0 (1.0 for an empty batch)
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.completed as f64 / self.total as f64).min(1.0)
        }
    }
}

#[derive(Debug)]
struct ProgressState {
    total: u64,
    completed: u64,
    active: bool,
    settle: Debouncer,
}

impl ProgressState {
    /// Apply a due deactivation. True if `active` just dropped.
    fn tick(&mut self) -> bool {
        if !self.settle.tick() {
            return false;
        }
        self.active = false;
        debug!("Progress: batch settled ({}/{})", self.completed, self.total);
        true
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            active: self.active,
        }
    }
}

/// Batch progress with debounced `active` flag.
#[derive(Debug)]
pub struct ProgressTracker {
    state: Mutex<ProgressState>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl ProgressTracker {
    /// `settle_delay` - how long `active` stays up after completion
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            state: Mutex::new(ProgressState {
                total: 0,
                completed: 0,
                active: false,
                settle: Debouncer::new(settle_delay),
            }),
        }
    }

    /// Announce `n` upcoming requests. A pending deactivation is cancelled.
    pub fn declare_batch_start(&self, n: u64) -> ProgressSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if n == 0 {
            return state.snapshot();
        }
        state.total += n;
        if !state.active {
            info!("Thumbnail batch started: {} requests", n);
        }
        state.active = true;
        state.settle.cancel();
        state.snapshot()
    }

    /// Count one settled job (success or failure).
    pub fn record_settlement(&self) -> ProgressSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.completed += 1;
        if state.completed >= state.total {
            state.settle.schedule();
        }
        state.snapshot()
    }

    /// Zero counters and drop the active flag immediately.
    pub fn reset(&self) -> ProgressSnapshot {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.total = 0;
        state.completed = 0;
        state.active = false;
        state.settle.cancel();
        state.snapshot()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.observe().0
    }

    /// Snapshot after applying a due deactivation; the flag is true exactly
    /// once, on the observation that dropped `active`.
    pub fn observe(&self) -> (ProgressSnapshot, bool) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let deactivated = state.tick();
        (state.snapshot(), deactivated)
    }

    /// Current counters without applying a due deactivation.
    pub fn peek(&self) -> ProgressSnapshot {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_declare_activates() {
        let progress = ProgressTracker::new(Duration::from_millis(50));
        let snap = progress.declare_batch_start(3);
        assert_eq!(snap, ProgressSnapshot { total: 3, completed: 0, active: true });

        progress.declare_batch_start(2);
        assert_eq!(progress.snapshot().total, 5);
    }

    #[test]
    fn test_zero_batch_is_noop() {
        let progress = ProgressTracker::new(Duration::from_millis(50));
        let snap = progress.declare_batch_start(0);
        assert_eq!(snap, ProgressSnapshot::default());
    }

    #[test]
    fn test_active_held_after_completion_then_dropped() {
        let progress = ProgressTracker::new(Duration::from_millis(40));
        progress.declare_batch_start(2);
        progress.record_settlement();
        let snap = progress.record_settlement();
        assert_eq!(snap.completed, 2);
        assert!(snap.active, "100% should stay visible for the settle delay");

        sleep(Duration::from_millis(80));
        assert!(!progress.snapshot().active);
    }

    #[test]
    fn test_incomplete_batch_stays_active() {
        let progress = ProgressTracker::new(Duration::from_millis(10));
        progress.declare_batch_start(3);
        progress.record_settlement();
        sleep(Duration::from_millis(30));
        assert!(progress.snapshot().active);
    }

    #[test]
    fn test_new_batch_cancels_pending_flip() {
        let progress = ProgressTracker::new(Duration::from_millis(40));
        progress.declare_batch_start(1);
        progress.record_settlement();

        progress.declare_batch_start(1);
        sleep(Duration::from_millis(80));
        let snap = progress.snapshot();
        assert!(snap.active);
        assert_eq!((snap.total, snap.completed), (2, 1));
    }

    #[test]
    fn test_second_equality_rearms() {
        let progress = ProgressTracker::new(Duration::from_millis(100));
        progress.declare_batch_start(1);
        progress.record_settlement();
        sleep(Duration::from_millis(60));

        // Late settlement (e.g. a job started before the batch) re-arms the delay
        progress.record_settlement();
        sleep(Duration::from_millis(60));
        assert!(progress.snapshot().active);

        sleep(Duration::from_millis(100));
        assert!(!progress.snapshot().active);
    }

    #[test]
    fn test_observe_reports_deactivation_once() {
        let progress = ProgressTracker::new(Duration::from_millis(20));
        progress.declare_batch_start(1);
        progress.record_settlement();
        assert!(!progress.observe().1);

        sleep(Duration::from_millis(50));
        // peek leaves the pending flip for the next observer
        assert!(progress.peek().active);
        let (snap, deactivated) = progress.observe();
        assert!(deactivated);
        assert!(!snap.active);
        assert_eq!(progress.observe(), (snap, false));
    }

    #[test]
    fn test_reset_zeroes_everything() {
        let progress = ProgressTracker::new(Duration::from_millis(500));
        progress.declare_batch_start(4);
        progress.record_settlement();
        assert_eq!(progress.reset(), ProgressSnapshot::default());
        assert_eq!(progress.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn test_fraction() {
        let snap = ProgressSnapshot { total: 4, completed: 1, active: true };
        assert!((snap.fraction() - 0.25).abs() < f64::EPSILON);
        assert!((ProgressSnapshot::default().fraction() - 1.0).abs() < f64::EPSILON);
    }
}
