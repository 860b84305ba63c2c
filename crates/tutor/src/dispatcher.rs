use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use keylight_domain::{Key, KeyAction, KeyEvent, OperatingMode};
use keylight_strip::{AmbientSelector, SharedSurface};

use crate::control::ControlState;
use crate::midi::InputSource;
use crate::session::SessionSlot;
use crate::tracker::PressOutcome;

/// Routes live key events to ambient lighting or to the tutoring session,
/// depending on the operating mode. Never waits on anything but the surface
/// and tracker locks.
pub struct InputDispatcher {
    state: Arc<ControlState>,
    session: Arc<SessionSlot>,
    surface: SharedSurface,
    ambient: AmbientSelector,
}

impl InputDispatcher {
    pub fn new(state: Arc<ControlState>, session: Arc<SessionSlot>, surface: SharedSurface) -> Self {
        Self {
            state,
            session,
            surface,
            ambient: AmbientSelector::new(),
        }
    }

    pub fn with_selector(mut self, ambient: AmbientSelector) -> Self {
        self.ambient = ambient;
        self
    }

    /// Processes events until the source runs dry.
    pub fn run(mut self, mut source: impl InputSource) -> Result<()> {
        while let Some(event) = source.next_event() {
            self.handle(event)?;
        }
        info!("live input closed");
        Ok(())
    }

    pub fn handle(&mut self, event: KeyEvent) -> Result<()> {
        debug!(key = %event.key, action = ?event.action, "live input");
        match (self.state.mode(), event.action) {
            (OperatingMode::FreePlay, KeyAction::Press) => self.ambient_press(event.key),
            (OperatingMode::FreePlay, KeyAction::Release) => {
                self.surface.paint_key(event.key, self.state.palette().base)
            }
            (OperatingMode::Tutoring, KeyAction::Press) => self.tutored_press(event.key),
            (OperatingMode::Tutoring, KeyAction::Release) => self.tutored_release(event.key),
        }
    }

    fn ambient_press(&mut self, key: Key) -> Result<()> {
        let ambient = &mut self.ambient;
        let color = self.state.update_settings(|settings| ambient.on_press(&mut settings.ambient));
        self.surface.paint_key(key, color)
    }

    fn tutored_press(&mut self, key: Key) -> Result<()> {
        let Some((outcome, stats)) = self
            .session
            .with_tracker(|tracker| (tracker.apply_press(key), tracker.stats()))
        else {
            debug!(%key, "no open session, press ignored");
            return Ok(());
        };
        let palette = self.state.palette();
        let color = match outcome {
            PressOutcome::Correct => palette.correct,
            PressOutcome::Mismatch => palette.wrong,
        };
        self.surface.paint_key(key, color)?;
        let accuracy = stats.accuracy();
        self.state.update_status(|status| status.accuracy = accuracy);
        Ok(())
    }

    fn tutored_release(&mut self, key: Key) -> Result<()> {
        let Some(still_expected) = self.session.with_tracker(|tracker| tracker.apply_release(key)) else {
            debug!(%key, "no open session, release ignored");
            return Ok(());
        };
        let palette = self.state.palette();
        let color = if still_expected { palette.guide } else { palette.base };
        self.surface.paint_key(key, color)
    }
}
