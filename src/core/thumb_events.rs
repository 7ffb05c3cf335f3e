//! Scheduler events published on the event bus.

use std::time::Duration;

use super::key::ThumbKey;
use super::progress::ProgressSnapshot;

/// How a job settled
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum Outcome {
    Rendered,
    /// Render failed; `transient` tells whether a retry could succeed
    Placeholder { transient: bool },
}

/// A job settled and its waiters were released
#[derive(Clone, Debug)]
pub struct ThumbnailSettled {
    pub key: ThumbKey,
    pub outcome: Outcome,
    /// Time from enqueue to settlement
    pub elapsed: Duration,
}

/// Everything the scheduler publishes
#[derive(Clone, Debug)]
pub enum SchedulerEvent {
    Settled(ThumbnailSettled),
    /// Counters changed: batch declared, job settled, reset, or the delayed
    /// deactivation after a finished batch
    Progress(ProgressSnapshot),
}

impl SchedulerEvent {
    pub fn settled(&self) -> Option<&ThumbnailSettled> {
        match self {
            SchedulerEvent::Settled(e) => Some(e),
            SchedulerEvent::Progress(_) => None,
        }
    }

    pub fn progress(&self) -> Option<ProgressSnapshot> {
        match self {
            SchedulerEvent::Progress(p) => Some(*p),
            SchedulerEvent::Settled(_) => None,
        }
    }
}
