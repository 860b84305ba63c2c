use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;
use tracing::debug;

use crate::scoring::AccuracyStats;
use crate::tracker::KeyStateTracker;

/// Holder of the one tracker of the running tutoring session.
///
/// Only the synchronizer opens and closes sessions. Everyone else reaches the
/// current tracker through [`SessionSlot::with_tracker`], which never hands out
/// a reference that could outlive the session. Every mutation wakes whoever
/// waits in [`SessionSlot::changed`].
#[derive(Debug, Default)]
pub struct SessionSlot {
    tracker: Mutex<Option<KeyStateTracker>>,
    changed: Notify,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<KeyStateTracker>> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces any previous session with a fresh tracker.
    pub(crate) fn open(&self) {
        *self.lock() = Some(KeyStateTracker::new());
        debug!("tutoring session opened");
        self.changed.notify_one();
    }

    /// Discards the session, returning its final counters.
    pub(crate) fn close(&self) -> Option<AccuracyStats> {
        let stats = self.lock().take().map(|tracker| tracker.stats());
        debug!(?stats, "tutoring session closed");
        self.changed.notify_one();
        stats
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs `f` on the current tracker, or returns `None` when no session is open.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&mut KeyStateTracker) -> R) -> Option<R> {
        let result = self.lock().as_mut().map(f);
        if result.is_some() {
            self.changed.notify_one();
        }
        result
    }

    /// Whether live state equals expected state. A missing session is never satisfied.
    pub fn is_satisfied(&self) -> bool {
        self.lock().as_ref().is_some_and(KeyStateTracker::is_satisfied)
    }

    pub fn stats(&self) -> Option<AccuracyStats> {
        self.lock().as_ref().map(KeyStateTracker::stats)
    }

    /// Resolves after the next tracker mutation, or at once if one happened
    /// since the last wake-up.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}
