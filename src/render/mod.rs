//! Render operations plugged into the scheduler.

pub mod ffmpeg;

pub use ffmpeg::{ClearReport, FfmpegRenderer, RefStyle, clear_disk_cache, locate_ffmpeg};
