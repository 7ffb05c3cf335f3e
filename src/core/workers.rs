//! Fixed pool of execution slots for render jobs.
//!
//! Each slot is one OS thread blocking on a shared FIFO backlog channel, so
//! the pool can never run more jobs than it has threads, no matter how fast
//! jobs arrive. A slot takes the next job as soon as the previous one
//! returns. Dispatch order is the enqueue order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Slot accounting shared with worker threads
#[derive(Debug, Default)]
struct SlotStats {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl SlotStats {
    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded worker pool draining a FIFO backlog.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(3)?;
/// workers.execute(move || {
///     // runs on one of the 3 slots
/// });
/// ```
pub struct Workers {
    backlog_tx: Option<Sender<Job>>,
    backlog_rx: Receiver<Job>,
    handles: Vec<thread::JoinHandle<()>>,
    stats: Arc<SlotStats>,
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("slots", &self.slots())
            .field("active", &self.active())
            .field("backlog", &self.backlog_len())
            .finish()
    }
}

impl Workers {
    /// Spawn `num_slots` worker threads (at least one).
    pub fn new(num_slots: usize) -> std::io::Result<Self> {
        let num_slots = num_slots.max(1);
        let (backlog_tx, backlog_rx) = unbounded::<Job>();
        let stats = Arc::new(SlotStats::default());

        let mut handles = Vec::with_capacity(num_slots);
        for slot_id in 0..num_slots {
            let rx = backlog_rx.clone();
            let stats = Arc::clone(&stats);

            let handle = thread::Builder::new()
                .name(format!("vthumb-slot-{}", slot_id))
                .spawn(move || {
                    trace!("Slot {} started", slot_id);

                    // recv() fails once the pool drops its sender and the backlog is drained
                    while let Ok(job) = rx.recv() {
                        stats.enter();
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            error!("Slot {}: job panicked", slot_id);
                        }
                        stats.leave();
                    }

                    trace!("Slot {} stopped", slot_id);
                })?;

            handles.push(handle);
        }

        trace!("Workers initialized: {} slots", num_slots);

        Ok(Self {
            backlog_tx: Some(backlog_tx),
            backlog_rx,
            handles,
            stats,
        })
    }

    /// Append a job to the backlog. It runs when a slot frees up.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.backlog_tx {
            if tx.send(Box::new(f)).is_err() {
                error!("Workers: backlog closed, job dropped");
            }
        }
    }

    pub fn slots(&self) -> usize {
        self.handles.len()
    }

    /// Jobs currently running
    pub fn active(&self) -> usize {
        self.stats.active.load(Ordering::SeqCst)
    }

    /// Highest number of jobs that ever ran at once
    pub fn peak_active(&self) -> usize {
        self.stats.peak.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a slot
    pub fn backlog_len(&self) -> usize {
        self.backlog_rx.len()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_slots = self.handles.len();
        trace!("Workers shutting down ({} slots)...", num_slots);

        // Closing the channel lets slots exit after the backlog drains
        self.backlog_tx.take();

        // Bounded wait: a slot stuck in a long render is left to die with the process
        let deadline = Instant::now() + Duration::from_millis(500);

        for handle in std::mem::take(&mut self.handles) {
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining slots");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} slots stopped", num_slots);
    }
}
