//! Synchronized playback state machine for scheduled broadcasts.
//!
//! One session per displayed content: `attach` arms the machine when the
//! content carries a scheduled start, `detach` tears it down on navigation.
//! The server offset is the only ground truth; the machine walks
//! AwaitingDuration -> Countdown -> Syncing -> FreePlayback, locking user
//! controls until the synchronized window has elapsed.
//!
//! Teardown is cooperative: in-flight offset fetches are never aborted, their
//! results are discarded by an epoch check before being applied. At most one
//! of the countdown tick and the resync tick is live at a time, and both die
//! with the session.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::content::{ContentDescriptor, ContentId};
use crate::drift::{Correction, DriftCorrector, RESUME_DEBOUNCE};
use crate::offset::OffsetSource;
use crate::player::{log_surface_result, MediaSurface};

/// Local countdown recomputation tick.
pub const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Periodic resync interval during the synchronized window.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Poll step while waiting for media duration metadata.
const METADATA_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    AwaitingDuration,
    Countdown,
    Syncing,
    FreePlayback,
}

/// Point-in-time view of the session, for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub phase: SyncPhase,
    /// Whole seconds left until the broadcast starts, rounded down.
    pub countdown_remaining: Option<u64>,
}

struct View {
    phase: SyncPhase,
    remaining: Option<f64>,
}

pub struct SyncController {
    inner: Arc<ControllerShared>,
}

struct ControllerShared {
    surface: Arc<dyn MediaSurface>,
    offsets: Arc<dyn OffsetSource>,
    drift: DriftCorrector,
    /// Session token; bumped on every detach so stale timer callbacks and
    /// late fetch results identify themselves and bail out.
    epoch: AtomicU64,
    view: Mutex<View>,
}

impl SyncController {
    pub fn new(surface: Arc<dyn MediaSurface>, offsets: Arc<dyn OffsetSource>) -> Self {
        Self {
            inner: Arc::new(ControllerShared {
                surface,
                offsets,
                drift: DriftCorrector::new(),
                epoch: AtomicU64::new(0),
                view: Mutex::new(View {
                    phase: SyncPhase::Idle,
                    remaining: None,
                }),
            }),
        }
    }

    /// Start a session for the displayed content. Content without a scheduled
    /// start plays freely and the machine stays `Idle`. Must be called from
    /// within a tokio runtime. Replaces any previous session.
    pub fn attach(&self, content: &ContentDescriptor) {
        self.detach();
        if !content.is_scheduled() {
            return;
        }

        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        self.inner.set_phase(SyncPhase::AwaitingDuration, None);

        let shared = Arc::clone(&self.inner);
        let content_id = content.content_id.clone();
        tokio::spawn(async move {
            shared.run_session(epoch, content_id).await;
        });
    }

    /// Tear down the current session (navigation away). Pending timers are
    /// cancelled deterministically; any in-flight fetch result is discarded.
    pub fn detach(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *self.inner.view.lock() = View {
            phase: SyncPhase::Idle,
            remaining: None,
        };
        self.inner.surface.set_controls_enabled(true);
    }

    pub fn phase(&self) -> SyncPhase {
        self.inner.view.lock().phase
    }

    pub fn snapshot(&self) -> SyncSnapshot {
        let view = self.inner.view.lock();
        SyncSnapshot {
            phase: view.phase,
            countdown_remaining: view.remaining.map(|r| r.max(0.0).floor() as u64),
        }
    }

    /// Forward the surface's pause event here. Any pause observed during the
    /// synchronized window, user-initiated or buffering-induced, is a fault
    /// to heal: playback resumes after a short debounce.
    pub fn handle_pause_event(&self) {
        if self.inner.view.lock().phase != SyncPhase::Syncing {
            return;
        }
        let epoch = self.inner.epoch.load(Ordering::SeqCst);
        let shared = Arc::clone(&self.inner);
        tokio::spawn(async move {
            sleep(RESUME_DEBOUNCE).await;
            if !shared.is_current(epoch) {
                return;
            }
            if shared.view.lock().phase == SyncPhase::Syncing && shared.surface.is_paused() {
                tracing::debug!("resuming playback paused during the synchronized window");
                log_surface_result(shared.surface.play(), "play");
            }
        });
    }

    /// Viewer seek request. While the synchronized window is active this is
    /// logged and ignored; the next resync overwrites any position anyway.
    /// Returns whether the seek was applied.
    pub fn request_seek(&self, position: f64) -> bool {
        match self.phase() {
            SyncPhase::AwaitingDuration | SyncPhase::Countdown | SyncPhase::Syncing => {
                tracing::info!("ignoring viewer seek to {position:.1}s while synchronized");
                false
            }
            SyncPhase::Idle | SyncPhase::FreePlayback => {
                log_surface_result(self.inner.surface.seek(position), "seek");
                true
            }
        }
    }

    /// Viewer pause request; swallowed while controls are locked.
    pub fn request_pause(&self) -> bool {
        match self.phase() {
            SyncPhase::AwaitingDuration | SyncPhase::Countdown | SyncPhase::Syncing => {
                tracing::info!("ignoring viewer pause while synchronized");
                false
            }
            SyncPhase::Idle | SyncPhase::FreePlayback => {
                log_surface_result(self.inner.surface.pause(), "pause");
                true
            }
        }
    }
}

impl ControllerShared {
    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::SeqCst) == epoch
    }

    fn set_phase(&self, phase: SyncPhase, remaining: Option<f64>) {
        let mut view = self.view.lock();
        view.phase = phase;
        view.remaining = remaining;
    }

    async fn run_session(&self, epoch: u64, content: ContentId) {
        // Scheduled content stays paused and locked until the offset says
        // otherwise.
        self.surface.set_controls_enabled(false);
        log_surface_result(self.surface.pause(), "pause");

        let duration = loop {
            if !self.is_current(epoch) {
                return;
            }
            if let Some(duration) = self.surface.duration() {
                break duration;
            }
            sleep(METADATA_POLL).await;
        };

        let Some(offset) = self.fetch_offset_retrying(epoch, &content).await else {
            return;
        };
        self.dispatch(epoch, &content, duration, offset).await;
    }

    /// Fetch the authoritative offset, holding state and retrying every
    /// countdown tick on failure. Returns `None` once the session is stale.
    async fn fetch_offset_retrying(&self, epoch: u64, content: &ContentId) -> Option<f64> {
        loop {
            let result = self.offsets.playback_offset(content).await;
            if !self.is_current(epoch) {
                // Resolved after the viewer navigated away; discard.
                return None;
            }
            match result {
                Ok(offset) => return Some(offset),
                Err(e) => tracing::debug!("offset fetch failed; holding state: {e:#}"),
            }
            sleep(COUNTDOWN_TICK).await;
            if !self.is_current(epoch) {
                return None;
            }
        }
    }

    async fn dispatch(&self, epoch: u64, content: &ContentId, duration: f64, offset: f64) {
        if offset < 0.0 {
            self.run_countdown(epoch, content, duration, -offset).await;
        } else if offset < duration {
            self.run_syncing(epoch, content, duration, offset).await;
        } else {
            self.enter_free_playback();
        }
    }

    async fn run_countdown(&self, epoch: u64, content: &ContentId, duration: f64, start: f64) {
        // Recomputed locally every second from the initial offset; the
        // server is only consulted again once the countdown reaches zero.
        let mut remaining = start;
        self.set_phase(SyncPhase::Countdown, Some(remaining));

        while remaining > 0.0 {
            sleep(COUNTDOWN_TICK).await;
            if !self.is_current(epoch) {
                return;
            }
            remaining -= 1.0;
            self.set_phase(SyncPhase::Countdown, Some(remaining.max(0.0)));
        }

        let Some(offset) = self.fetch_offset_retrying(epoch, content).await else {
            return;
        };
        // The fresh offset may still be negative if the local countdown ran
        // ahead of the server clock; dispatching again covers every case.
        Box::pin(self.dispatch(epoch, content, duration, offset)).await;
    }

    async fn run_syncing(&self, epoch: u64, content: &ContentId, duration: f64, offset: f64) {
        self.set_phase(SyncPhase::Syncing, None);
        self.surface.set_controls_enabled(false);
        self.apply_offset(offset);

        let mut resync = tokio::time::interval(RESYNC_INTERVAL);
        resync.tick().await; // first tick completes immediately

        loop {
            resync.tick().await;
            if !self.is_current(epoch) {
                return;
            }
            let result = self.offsets.playback_offset(content).await;
            if !self.is_current(epoch) {
                return;
            }
            match result {
                Err(e) => {
                    // Transient failure: hold state, the next tick retries.
                    tracing::debug!("resync fetch failed; retrying next tick: {e:#}");
                }
                Ok(offset) if offset >= duration => {
                    self.enter_free_playback();
                    return;
                }
                Ok(offset) => self.apply_offset(offset),
            }
        }
    }

    /// Correct local playback toward the authoritative target and make sure
    /// we are actually playing.
    fn apply_offset(&self, target: f64) {
        match self.surface.position() {
            Ok(position) => {
                if let Correction::Seek(to) = self.drift.evaluate(position, target) {
                    tracing::info!("hard correction: {position:.1}s -> {to:.1}s");
                    log_surface_result(self.surface.seek(to), "seek");
                }
            }
            Err(e) => tracing::warn!("cannot read playback position: {e}"),
        }
        if self.surface.is_paused() {
            log_surface_result(self.surface.play(), "play");
        }
    }

    /// The synchronized window is over, not "caught up": reset to the start
    /// and hand the transport back to the viewer.
    fn enter_free_playback(&self) {
        self.set_phase(SyncPhase::FreePlayback, None);
        log_surface_result(self.surface.pause(), "pause");
        log_surface_result(self.surface.seek(0.0), "seek");
        self.surface.set_controls_enabled(true);
    }
}
