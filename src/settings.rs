//! Persistent settings (`vthumb.json`).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::scheduler::{DEFAULT_MAX_CONCURRENT, SchedulerConfig};

/// Directory name used by the original browser for rendered thumbnails
pub const THUMBS_DIR_NAME: &str = "video_manage_thumbnails";

/// Thumbnail generation settings
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(default)]
pub struct ThumbSettings {
    // Scheduler
    pub max_concurrent: usize, // Simultaneous ffmpeg processes (default 3)
    pub settle_delay_ms: u64,  // Progress stays visible this long after 100% (default 500)

    // Renderer
    pub thumb_width: u32,          // Output width, height keeps aspect (default 320)
    pub render_timeout_ms: u64,    // Per ffmpeg attempt, 0 = no timeout
    pub ffmpeg_path: Option<PathBuf>,
    pub out_dir: Option<PathBuf>,  // None = <temp>/video_manage_thumbnails
    pub inline_data_uri: bool,     // data: URI (true) or output file path (false)
}

impl Default for ThumbSettings {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            settle_delay_ms: 500,
            thumb_width: 320,
            render_timeout_ms: 0,
            ffmpeg_path: None,
            out_dir: None,
            inline_data_uri: true,
        }
    }
}

impl ThumbSettings {
    /// Load from JSON. A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: ThumbSettings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        Ok(settings)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_concurrent: self.max_concurrent.max(1),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
        }
    }

    pub fn render_timeout(&self) -> Option<Duration> {
        (self.render_timeout_ms > 0).then(|| Duration::from_millis(self.render_timeout_ms))
    }

    /// Where rendered JPEGs go
    pub fn thumbs_dir(&self) -> PathBuf {
        self.out_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(THUMBS_DIR_NAME))
    }
}
