//! VTHUMB - video thumbnail scheduler library
//!
//! Turns "thumbnail for this video" requests into a bounded number of
//! concurrent ffmpeg renders with caching, in-flight deduplication and batch
//! progress. Re-exports all modules for use by the binary target.

// Core scheduler (cache, progress, workers)
pub mod core;

// Render operations
pub mod render;

// App modules
pub mod cli;
pub mod paths;
pub mod scan;
pub mod settings;

// Re-export commonly used types from core
pub use crate::core::entry::{CacheEntry, ThumbRef};
pub use crate::core::error::RenderError;
pub use crate::core::event_bus::EventBus;
pub use crate::core::thumb_events::SchedulerEvent;
pub use crate::core::key::ThumbKey;
pub use crate::core::progress::ProgressSnapshot;
pub use crate::core::scheduler::{Pending, Scheduler, SchedulerConfig};
pub use crate::core::traits::Renderer;
pub use crate::render::FfmpegRenderer;
pub use crate::settings::ThumbSettings;
