//! Core scheduling modules - cache, progress, workers, scheduler
//!
//! Independent of the ffmpeg renderer and of any UI.

pub mod debounce;
pub mod entry;
pub mod error;
pub mod event_bus;
pub mod key;
pub mod progress;
pub mod result_cache;
pub mod scheduler;
pub mod thumb_events;
pub mod traits;
pub mod workers;

// Re-exports for convenience
pub use debounce::Debouncer;
pub use entry::{CacheEntry, PLACEHOLDER_URI, ThumbRef};
pub use error::RenderError;
pub use event_bus::{EventBus, EventEmitter};
pub use key::ThumbKey;
pub use progress::{ProgressSnapshot, ProgressTracker};
pub use result_cache::{CacheStats, CacheStatsSnapshot, ResultCache};
pub use scheduler::{DEFAULT_MAX_CONCURRENT, Pending, Scheduler, SchedulerConfig};
pub use thumb_events::{Outcome, SchedulerEvent, ThumbnailSettled};
pub use traits::Renderer;
pub use workers::Workers;
