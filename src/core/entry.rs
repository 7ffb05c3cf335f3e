//! Thumbnail references and settled cache entries.

use std::fmt;
use std::sync::Arc;

use super::error::RenderError;

/// Inline SVG shown for videos whose thumbnail could not be rendered
/// (grey rounded frame with a play triangle).
pub const PLACEHOLDER_URI: &str = "data:image/svg+xml,%3Csvg xmlns='http://www.w3.org/2000/svg' width='64' height='64' fill='%239ca3af'%3E%3Crect x='8' y='16' width='48' height='32' rx='4' fill='none' stroke='%239ca3af' stroke-width='2'/%3E%3Cpath d='M28 26l12 8-12 8z' fill='%239ca3af'/%3E%3C/svg%3E";

/// Opaque handle to a displayable thumbnail (data URI or file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(transparent)]
pub struct ThumbRef(String);

impl ThumbRef {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_URI.to_string())
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_URI
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThumbRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ThumbRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ThumbRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Settled value stored per key.
///
/// `Failed` is the placeholder entry: it keeps the failure that produced it
/// but always resolves to [`ThumbRef::placeholder`].
#[derive(Debug, Clone)]
pub enum CacheEntry {
    Ready(ThumbRef),
    Failed(Arc<RenderError>),
}

impl CacheEntry {
    pub fn from_result(result: Result<ThumbRef, RenderError>) -> Self {
        match result {
            Ok(thumb) => CacheEntry::Ready(thumb),
            Err(e) => CacheEntry::Failed(Arc::new(e)),
        }
    }

    /// Reference handed to callers.
    pub fn thumb(&self) -> ThumbRef {
        match self {
            CacheEntry::Ready(thumb) => thumb.clone(),
            CacheEntry::Failed(_) => ThumbRef::placeholder(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, CacheEntry::Failed(_))
    }

    pub fn error(&self) -> Option<&RenderError> {
        match self {
            CacheEntry::Ready(_) => None,
            CacheEntry::Failed(e) => Some(e),
        }
    }
}
