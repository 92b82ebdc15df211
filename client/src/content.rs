use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier for a published video.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// The content currently displayed by a viewer.
///
/// Immutable once loaded; replaced wholesale when navigating to different
/// content. Total duration is not part of the descriptor because it is only
/// known once the media surface has loaded its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentDescriptor {
    pub content_id: ContentId,
    pub title: String,
    /// Absolute scheduled broadcast start on the server's clock. Presence of
    /// this field is what arms the synchronized playback machine.
    pub scheduled_start: Option<DateTime<Utc>>,
}

impl ContentDescriptor {
    pub fn is_scheduled(&self) -> bool {
        self.scheduled_start.is_some()
    }
}
