//! Playback surface consumed by the sync controller.
//!
//! The raw decode/render pipeline stays outside this crate; the controller
//! only talks to a standard play/pause/seek/position surface plus a control
//! lock for the synchronized window.

/// Surface over the embedding video player.
///
/// Implementations should be cheap to call from timer callbacks. Errors are
/// reported as strings; the controller logs them and degrades to a no-op
/// rather than surfacing them to the view layer.
pub trait MediaSurface: Send + Sync {
    fn play(&self) -> Result<(), String>;

    fn pause(&self) -> Result<(), String>;

    /// Seek to an absolute position in seconds.
    fn seek(&self, position_secs: f64) -> Result<(), String>;

    /// Current playback position in seconds.
    fn position(&self) -> Result<f64, String>;

    /// Total duration in seconds, once media metadata has loaded.
    fn duration(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    /// Enable or disable user-facing transport controls.
    fn set_controls_enabled(&self, enabled: bool);
}

/// Log a failed surface call and carry on.
pub(crate) fn log_surface_result(result: Result<(), String>, action: &str) {
    if let Err(e) = result {
        tracing::warn!("media surface {action} failed: {e}");
    }
}
