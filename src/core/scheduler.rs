//! Thumbnail scheduler - deduplicating, bounded, cached render dispatch.
//!
//! Request flow:
//! 1. Cache hit: answer immediately
//! 2. Key in flight: join the existing job's waiter list
//! 3. Otherwise: new job, appended to the FIFO backlog of the worker pool
//!
//! Settlement writes the cache (thumbnail or placeholder), removes the key from
//! the in-flight map, counts progress, then releases every waiter with the
//! same value. Render failures never reach callers.
//!
//! Locking: `in_flight` is always taken before the cache's own lock, so the
//! check-then-insert of a request and the put-then-remove of a settlement are
//! atomic with respect to each other. Progress is never held while taking
//! `in_flight`. Events are emitted with no lock held.
//!
//! The delayed deactivation of `active` after a finished batch is applied by
//! the first observation past the deadline (`progress()`, `submit()` or a
//! zero-size `declare_batch_start`), which also publishes it as a progress
//! event. A UI loop that only listens to events still has to call
//! `progress()` once in a while to receive it.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use log::{debug, info, warn};

use super::entry::{CacheEntry, ThumbRef};
use super::error::RenderError;
use super::event_bus::EventEmitter;
use super::key::ThumbKey;
use super::progress::{ProgressSnapshot, ProgressTracker};
use super::result_cache::{CacheStatsSnapshot, ResultCache};
use super::thumb_events::{Outcome, SchedulerEvent, ThumbnailSettled};
use super::traits::Renderer;
use super::workers::Workers;

/// Default number of simultaneous renders
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Execution slots (simultaneous renders)
    pub max_concurrent: usize,
    /// How long progress stays `active` after a batch completes
    pub settle_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            settle_delay: Duration::from_millis(500),
        }
    }
}

/// One pending render and everyone waiting for it.
///
/// Waiters live here rather than in the in-flight map, so a reset that clears
/// the map cannot strand a suspended caller.
struct Job {
    id: u64,
    key: ThumbKey,
    enqueued_at: Instant,
    waiters: Mutex<Vec<Sender<ThumbRef>>>,
}

impl Job {
    fn join(&self) -> Receiver<ThumbRef> {
        let (tx, rx) = bounded(1);
        self.waiters.lock().unwrap_or_else(|e| e.into_inner()).push(tx);
        rx
    }

    fn take_waiters(&self) -> Vec<Sender<ThumbRef>> {
        std::mem::take(&mut *self.waiters.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// State shared between the scheduler handle and worker slots
struct Shared {
    renderer: Box<dyn Renderer>,
    cache: ResultCache,
    in_flight: Mutex<HashMap<ThumbKey, Arc<Job>>>,
    progress: ProgressTracker,
    events: Option<EventEmitter>,
    next_job_id: AtomicU64,
}

impl Shared {
    /// Slot body: render, then settle.
    fn run(&self, job: Arc<Job>) {
        debug!(
            "Dispatching job #{} for {} (queued {} ms)",
            job.id,
            job.key,
            job.enqueued_at.elapsed().as_millis()
        );

        let started = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.renderer.render(&job.key)))
            .unwrap_or_else(|payload| Err(RenderError::Panicked(panic_message(payload.as_ref()))));

        match &result {
            Ok(_) => debug!(
                "Rendered {} in {} ms",
                job.key,
                started.elapsed().as_millis()
            ),
            Err(e) => warn!(
                "Thumbnail failed for {}: {} ({}, placeholder cached)",
                job.key,
                e,
                if e.is_transient() { "transient" } else { "permanent" }
            ),
        }

        self.settle(&job, CacheEntry::from_result(result));
    }

    fn settle(&self, job: &Job, entry: CacheEntry) {
        let thumb = entry.thumb();
        let outcome = match entry.error() {
            None => Outcome::Rendered,
            Some(e) => Outcome::Placeholder { transient: e.is_transient() },
        };

        let waiters = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            self.cache.put(job.key.clone(), entry);
            // After a reset the key may belong to a newer job
            if in_flight.get(&job.key).is_some_and(|current| current.id == job.id) {
                in_flight.remove(&job.key);
            }
            job.take_waiters()
        };

        let snapshot = self.progress.record_settlement();

        let released = waiters.len();
        for tx in waiters {
            // Receiver gone means the caller dropped its Pending
            let _ = tx.send(thumb.clone());
        }
        debug!("Job #{} settled: {} waiter(s) released", job.id, released);

        if let Some(events) = &self.events {
            events.emit(SchedulerEvent::Settled(ThumbnailSettled {
                key: job.key.clone(),
                outcome,
                elapsed: job.enqueued_at.elapsed(),
            }));
            events.emit(SchedulerEvent::Progress(snapshot));
        }
    }

    fn emit_progress(&self, snapshot: ProgressSnapshot) {
        if let Some(events) = &self.events {
            events.emit(SchedulerEvent::Progress(snapshot));
        }
    }

    /// Read progress, publishing the deactivation if this call applied it.
    fn observe_progress(&self) -> ProgressSnapshot {
        let (snapshot, deactivated) = self.progress.observe();
        if deactivated {
            self.emit_progress(snapshot);
        }
        snapshot
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a requested thumbnail.
///
/// `Ready` on a cache hit, otherwise `Waiting` until the job settles.
/// Every outcome resolves to a displayable reference.
#[derive(Debug)]
pub enum Pending {
    Ready(ThumbRef),
    Waiting { key: ThumbKey, rx: Receiver<ThumbRef> },
}

impl Pending {
    pub fn is_ready(&self) -> bool {
        matches!(self, Pending::Ready(_))
    }

    /// Block until settled.
    pub fn wait(self) -> ThumbRef {
        match self {
            Pending::Ready(thumb) => thumb,
            Pending::Waiting { key, rx } => rx.recv().unwrap_or_else(|_| {
                warn!("Scheduler shut down before {} settled", key);
                ThumbRef::placeholder()
            }),
        }
    }

    /// Block up to `timeout`. Returns None if still pending.
    pub fn wait_timeout(&mut self, timeout: Duration) -> Option<ThumbRef> {
        let received = match self {
            Pending::Ready(thumb) => return Some(thumb.clone()),
            Pending::Waiting { rx, .. } => rx.recv_timeout(timeout),
        };
        let thumb = match received {
            Ok(thumb) => thumb,
            Err(RecvTimeoutError::Timeout) => return None,
            Err(RecvTimeoutError::Disconnected) => ThumbRef::placeholder(),
        };
        *self = Pending::Ready(thumb.clone());
        Some(thumb)
    }

    /// Non-blocking poll, for UI update loops.
    pub fn try_get(&mut self) -> Option<ThumbRef> {
        let received = match self {
            Pending::Ready(thumb) => return Some(thumb.clone()),
            Pending::Waiting { rx, .. } => rx.try_recv(),
        };
        let thumb = match received {
            Ok(thumb) => thumb,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => ThumbRef::placeholder(),
        };
        *self = Pending::Ready(thumb.clone());
        Some(thumb)
    }
}

/// Thumbnail generation scheduler.
///
/// Owns the result cache, in-flight map, progress counters and the worker
/// pool. Independent instances share nothing.
///
/// # Example
/// ```ignore
/// let scheduler = Scheduler::new(settings.scheduler_config(), FfmpegRenderer::from_settings(&settings))?;
/// scheduler.declare_batch_start(files.len() as u64);
/// let pending: Vec<_> = files.iter().map(|f| scheduler.submit(f.as_path())).collect();
/// for p in pending {
///     show(p.wait());
/// }
/// ```
pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Workers,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("workers", &self.workers)
            .field("in_flight", &self.in_flight())
            .field("cached", &self.shared.cache.len())
            .field("progress", &self.shared.progress.peek())
            .finish()
    }
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, renderer: impl Renderer + 'static) -> std::io::Result<Self> {
        Self::build(config, Box::new(renderer), None)
    }

    /// Like `new`, publishing settlements and progress changes to `events`.
    pub fn with_events(
        config: SchedulerConfig,
        renderer: impl Renderer + 'static,
        events: EventEmitter,
    ) -> std::io::Result<Self> {
        Self::build(config, Box::new(renderer), Some(events))
    }

    fn build(
        config: SchedulerConfig,
        renderer: Box<dyn Renderer>,
        events: Option<EventEmitter>,
    ) -> std::io::Result<Self> {
        let workers = Workers::new(config.max_concurrent)?;
        info!(
            "Scheduler created: {} slots, settle delay {} ms",
            workers.slots(),
            config.settle_delay.as_millis()
        );

        Ok(Self {
            shared: Arc::new(Shared {
                renderer,
                cache: ResultCache::new(),
                in_flight: Mutex::new(HashMap::new()),
                progress: ProgressTracker::new(config.settle_delay),
                events,
                next_job_id: AtomicU64::new(1),
            }),
            workers,
        })
    }

    /// Request a thumbnail without blocking.
    pub fn submit(&self, key: impl Into<ThumbKey>) -> Pending {
        let key = key.into();
        let shared = &self.shared;
        shared.observe_progress();

        let job = {
            let mut in_flight = shared.in_flight.lock().unwrap_or_else(|e| e.into_inner());

            if let Some(entry) = shared.cache.lookup(&key) {
                return Pending::Ready(entry.thumb());
            }

            if let Some(job) = in_flight.get(&key) {
                debug!("Joined in-flight job #{} for {}", job.id, key);
                let rx = job.join();
                return Pending::Waiting { key, rx };
            }

            let job = Arc::new(Job {
                id: shared.next_job_id.fetch_add(1, Ordering::Relaxed),
                key: key.clone(),
                enqueued_at: Instant::now(),
                waiters: Mutex::new(Vec::new()),
            });
            in_flight.insert(key.clone(), Arc::clone(&job));
            job
        };

        let rx = job.join();
        debug!("Queued job #{} for {}", job.id, key);

        let worker_shared = Arc::clone(shared);
        self.workers.execute(move || worker_shared.run(job));

        Pending::Waiting { key, rx }
    }

    /// Request a thumbnail, blocking the calling thread until it settles.
    ///
    /// Never fails: a failed render yields the placeholder reference.
    pub fn request(&self, key: impl Into<ThumbKey>) -> ThumbRef {
        self.submit(key).wait()
    }

    /// Announce `n` upcoming requests for progress reporting.
    pub fn declare_batch_start(&self, n: u64) -> ProgressSnapshot {
        if n == 0 {
            return self.progress();
        }
        let snapshot = self.shared.progress.declare_batch_start(n);
        self.shared.emit_progress(snapshot);
        snapshot
    }

    /// Hard reset between browsing sessions: zero progress, forget in-flight
    /// keys, clear the cache. Jobs already queued still run and release
    /// their waiters; their results repopulate the cache.
    pub fn reset_progress(&self) {
        let (snapshot, dropped, cleared) = {
            let mut in_flight = self.shared.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let dropped = in_flight.len();
            in_flight.clear();
            let cleared = self.shared.cache.reset();
            (self.shared.progress.reset(), dropped, cleared)
        };
        info!(
            "Scheduler reset: {} cached entries cleared, {} in-flight keys forgotten",
            cleared, dropped
        );
        self.shared.emit_progress(snapshot);
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.shared.observe_progress()
    }

    /// Settled entry for `key`, if any (no statistics side effect).
    pub fn cached(&self, key: &ThumbKey) -> Option<CacheEntry> {
        self.shared.cache.get(key)
    }

    pub fn cache_stats(&self) -> CacheStatsSnapshot {
        self.shared.cache.stats()
    }

    /// Keys queued or rendering
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Jobs waiting for a free slot
    pub fn backlog_len(&self) -> usize {
        self.workers.backlog_len()
    }

    /// Renders running right now
    pub fn active_renders(&self) -> usize {
        self.workers.active()
    }

    /// Highest number of simultaneous renders observed
    pub fn peak_renders(&self) -> usize {
        self.workers.peak_active()
    }

    pub fn max_concurrent(&self) -> usize {
        self.workers.slots()
    }
}
