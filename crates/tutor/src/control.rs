use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use keylight_domain::{OperatingMode, Palette, Settings};

use crate::synchronizer::SyncPhase;

/// What the control plane can observe about playback.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackStatus {
    pub phase: SyncPhase,
    /// Share of the current song already matched, 0..=100.
    pub percent: u8,
    /// Running accuracy of the current (or last finished) session.
    pub accuracy: f64,
    pub song: Option<String>,
}

impl Default for PlaybackStatus {
    fn default() -> Self {
        Self {
            phase: SyncPhase::Idle,
            percent: 0,
            accuracy: 100.0,
            song: None,
        }
    }
}

/// Process-wide state shared by the dispatcher, the synchronizer and the
/// control plane.
///
/// The operating mode travels on a watch channel so waiters wake on every
/// change. Settings fields are read and written independently; callers never
/// rely on two fields changing together.
#[derive(Debug)]
pub struct ControlState {
    mode: watch::Sender<OperatingMode>,
    settings: RwLock<Settings>,
    status: watch::Sender<PlaybackStatus>,
}

impl ControlState {
    pub fn new(settings: Settings) -> Self {
        let (mode, _) = watch::channel(OperatingMode::FreePlay);
        let (status, _) = watch::channel(PlaybackStatus::default());
        Self {
            mode,
            settings: RwLock::new(settings),
            status,
        }
    }

    pub fn mode(&self) -> OperatingMode {
        *self.mode.borrow()
    }

    pub fn set_mode(&self, mode: OperatingMode) {
        let previous = self.mode.send_replace(mode);
        if previous != mode {
            info!(from = %previous, to = %mode, "operating mode changed");
        }
    }

    pub fn subscribe_mode(&self) -> watch::Receiver<OperatingMode> {
        self.mode.subscribe()
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn palette(&self) -> Palette {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .palette
    }

    pub fn update_settings<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut settings)
    }

    pub fn status(&self) -> PlaybackStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.status.subscribe()
    }

    pub(crate) fn update_status(&self, f: impl FnOnce(&mut PlaybackStatus)) {
        self.status.send_modify(f);
    }
}

impl Default for ControlState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
