//! Drift correction between local playback position and the authoritative
//! offset.
//!
//! Convergence is deliberately blunt: a dead-band absorbs sub-2s jitter so
//! viewers don't see constant micro-seeks, and anything beyond it gets a hard
//! seek straight to the target with no smoothing or ramping.

use std::time::Duration;

/// Maximum tolerated drift before a hard correction, in seconds.
pub const MAX_DRIFT_SECS: f64 = 2.0;

/// Wait before healing a pause observed during the synchronized window, so we
/// don't fight transient browser-style pause events.
pub const RESUME_DEBOUNCE: Duration = Duration::from_millis(100);

/// Outcome of comparing local position against the authoritative target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    /// Within the dead-band; leave playback alone.
    None,
    /// Hard-seek to exactly this position.
    Seek(f64),
}

#[derive(Debug, Clone)]
pub struct DriftCorrector {
    max_drift: f64,
}

impl DriftCorrector {
    pub fn new() -> Self {
        Self {
            max_drift: MAX_DRIFT_SECS,
        }
    }

    /// Decide whether the local position needs a hard correction toward the
    /// target offset.
    pub fn evaluate(&self, position: f64, target: f64) -> Correction {
        let drift = (position - target).abs();
        if drift > self.max_drift {
            Correction::Seek(target)
        } else {
            Correction::None
        }
    }
}

impl Default for DriftCorrector {
    fn default() -> Self {
        Self::new()
    }
}
