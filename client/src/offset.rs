use async_trait::async_trait;

use crate::content::ContentId;

/// Source of the server-authoritative playback offset.
///
/// The returned value is elapsed seconds into the scheduled broadcast's
/// timeline at the moment of the query: negative means the broadcast has not
/// started (countdown remaining is the absolute value), values past the media
/// duration mean the synchronized window has elapsed. Offsets are fetched
/// fresh on demand and never cached; the local playback clock is never
/// treated as ground truth.
#[async_trait]
pub trait OffsetSource: Send + Sync {
    async fn playback_offset(&self, content: &ContentId) -> anyhow::Result<f64>;
}
