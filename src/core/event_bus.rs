//! Scheduler event channel.
//!
//! Two ways to observe a scheduler:
//! - listeners: called synchronously on the publishing thread (a worker slot
//!   for settlements), so they must be quick
//! - the queue: a bounded channel a UI loop drains with `poll()` or blocks on
//!   with `recv_timeout()`
//!
//! A full queue drops its oldest event, never blocks the publisher.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use log::warn;

use super::thumb_events::SchedulerEvent;

/// Default queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

type Listener = Arc<dyn Fn(&SchedulerEvent) + Send + Sync>;

struct Channel {
    listeners: RwLock<Vec<Listener>>,
    tx: Sender<SchedulerEvent>,
    // Kept on the publishing side too, to evict the oldest event when full
    rx: Receiver<SchedulerEvent>,
    dropped: AtomicU64,
}

impl Channel {
    fn publish(&self, event: SchedulerEvent) {
        // Snapshot so a listener may subscribe without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for listener in &listeners {
            listener(&event);
        }

        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if self.rx.try_recv().is_ok() {
                        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if dropped == 1 || dropped % 100 == 0 {
                            warn!("Event queue full, {} oldest events dropped so far", dropped);
                        }
                    }
                    event = back;
                }
                // Unreachable while `rx` lives here
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }
}

/// Listener registry plus bounded event queue.
///
/// # Example
/// ```ignore
/// let bus = EventBus::new();
/// bus.subscribe(|e| {
///     if let Some(settled) = e.settled() {
///         log::info!("{} -> {:?}", settled.key, settled.outcome);
///     }
/// });
/// let scheduler = Scheduler::with_events(config, renderer, bus.emitter())?;
/// ```
#[derive(Clone)]
pub struct EventBus {
    channel: Arc<Channel>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("queued", &self.queue_len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            channel: Arc::new(Channel {
                listeners: RwLock::new(Vec::new()),
                tx,
                rx,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Register a listener. Listeners are called in subscription order.
    pub fn subscribe<F>(&self, listener: F)
    where
        F: Fn(&SchedulerEvent) + Send + Sync + 'static,
    {
        self.channel
            .listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(listener));
    }

    /// Handle for the publishing side (the scheduler).
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            channel: Arc::clone(&self.channel),
        }
    }

    /// Take every queued event, oldest first.
    pub fn poll(&self) -> Vec<SchedulerEvent> {
        self.channel.rx.try_iter().collect()
    }

    /// Block up to `timeout` for the next queued event.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<SchedulerEvent> {
        self.channel.rx.recv_timeout(timeout).ok()
    }

    pub fn queue_len(&self) -> usize {
        self.channel.rx.len()
    }

    /// Events evicted from a full queue since creation
    pub fn dropped(&self) -> u64 {
        self.channel.dropped.load(Ordering::Relaxed)
    }

    pub fn listener_count(&self) -> usize {
        self.channel
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Publishing handle sharing the bus's listeners and queue.
#[derive(Clone)]
pub struct EventEmitter {
    channel: Arc<Channel>,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("queued", &self.channel.rx.len())
            .finish()
    }
}

impl EventEmitter {
    pub fn emit(&self, event: SchedulerEvent) {
        self.channel.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::key::ThumbKey;
    use crate::core::progress::ProgressSnapshot;
    use crate::core::thumb_events::{Outcome, ThumbnailSettled};
    use std::sync::Mutex;

    fn progress(completed: u64) -> SchedulerEvent {
        SchedulerEvent::Progress(ProgressSnapshot {
            total: 10,
            completed,
            active: true,
        })
    }

    fn settled(path: &str) -> SchedulerEvent {
        SchedulerEvent::Settled(ThumbnailSettled {
            key: ThumbKey::new(path),
            outcome: Outcome::Rendered,
            elapsed: Duration::from_millis(5),
        })
    }

    #[test]
    fn test_listeners_run_in_order_before_queueing() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            let queued = bus.clone();
            bus.subscribe(move |e| {
                // Listener runs before the event reaches the queue
                let depth = queued.queue_len();
                seen.lock().unwrap().push((name, e.progress().map(|p| p.completed), depth));
            });
        }
        assert_eq!(bus.listener_count(), 2);

        bus.emitter().emit(progress(3));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", Some(3), 0), ("second", Some(3), 0)]
        );
        assert_eq!(bus.queue_len(), 1);
    }

    #[test]
    fn test_poll_drains_in_publish_order() {
        let bus = EventBus::new();
        let emitter = bus.emitter();

        emitter.emit(settled("/v/a.mp4"));
        emitter.emit(progress(1));

        let events = bus.poll();
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].settled().map(|s| s.key.clone()),
            Some(ThumbKey::new("/v/a.mp4"))
        );
        assert!(events[0].progress().is_none());
        assert_eq!(events[1].progress().map(|p| p.completed), Some(1));

        assert!(bus.poll().is_empty());
    }

    #[test]
    fn test_recv_timeout() {
        let bus = EventBus::new();
        assert!(bus.recv_timeout(Duration::from_millis(10)).is_none());

        let emitter = bus.emitter();
        let publisher = std::thread::spawn(move || emitter.emit(progress(7)));
        let event = bus.recv_timeout(Duration::from_secs(5));
        publisher.join().unwrap();
        assert_eq!(event.and_then(|e| e.progress()).map(|p| p.completed), Some(7));
    }

    #[test]
    fn test_full_queue_drops_oldest() {
        let bus = EventBus::with_capacity(3);
        let emitter = bus.emitter();
        for completed in 0..5 {
            emitter.emit(progress(completed));
        }

        assert_eq!(bus.dropped(), 2);
        let kept: Vec<u64> = bus
            .poll()
            .iter()
            .filter_map(|e| e.progress())
            .map(|p| p.completed)
            .collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }
}
