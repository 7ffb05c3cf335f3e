//! Render failure taxonomy.
//!
//! Failures never reach callers of the scheduler; they are absorbed into a
//! placeholder cache entry. The variants are still kept apart so a retry
//! policy can tell transient failures from permanent ones.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Error raised by a render operation.
#[derive(Debug)]
pub enum RenderError {
    /// Input video does not exist
    InputMissing(PathBuf),
    /// Renderer process could not be started
    Spawn { program: PathBuf, source: io::Error },
    /// ffmpeg ran but exited unsuccessfully
    Ffmpeg { status: Option<i32>, stderr: String },
    /// Attempt exceeded the configured timeout and was killed
    Timeout(Duration),
    /// Reading or writing the output image failed
    Io(io::Error),
    /// Renderer panicked on a worker slot
    Panicked(String),
    /// Failure reported by a custom renderer
    Other(String),
}

impl RenderError {
    pub fn other(msg: impl Into<String>) -> Self {
        RenderError::Other(msg.into())
    }

    /// Whether the same request could plausibly succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RenderError::Spawn { .. }
                | RenderError::Timeout(_)
                | RenderError::Io(_)
                | RenderError::Panicked(_)
        )
    }
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::InputMissing(path) => {
                write!(f, "Input video not found: {}", path.display())
            }
            RenderError::Spawn { program, source } => {
                write!(f, "Failed to start {}: {}", program.display(), source)
            }
            RenderError::Ffmpeg { status, stderr } => match status {
                Some(code) => write!(f, "ffmpeg exited with status {}: {}", code, stderr.trim()),
                None => write!(f, "ffmpeg terminated by signal: {}", stderr.trim()),
            },
            RenderError::Timeout(limit) => {
                write!(f, "Render timed out after {} ms", limit.as_millis())
            }
            RenderError::Io(e) => write!(f, "Thumbnail I/O error: {}", e),
            RenderError::Panicked(msg) => write!(f, "Renderer panicked: {}", msg),
            RenderError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Spawn { source, .. } => Some(source),
            RenderError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RenderError {
    fn from(e: io::Error) -> Self {
        RenderError::Io(e)
    }
}
