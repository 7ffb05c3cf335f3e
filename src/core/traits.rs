//! Render operation consumed by the scheduler.
//!
//! The scheduler only knows this trait; the ffmpeg implementation lives in
//! `render/`, tests plug in closures.

use super::entry::ThumbRef;
use super::error::RenderError;
use super::key::ThumbKey;

/// Potentially slow, potentially failing thumbnail producer.
///
/// Called from worker slots, never from the requesting thread.
pub trait Renderer: Send + Sync {
    fn render(&self, key: &ThumbKey) -> Result<ThumbRef, RenderError>;
}

/// Blanket impl: plain closures are renderers
impl<F> Renderer for F
where
    F: Fn(&ThumbKey) -> Result<ThumbRef, RenderError> + Send + Sync,
{
    fn render(&self, key: &ThumbKey) -> Result<ThumbRef, RenderError> {
        self(key)
    }
}
