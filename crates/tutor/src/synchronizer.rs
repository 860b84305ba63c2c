use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use keylight_domain::{KeyEvent, OperatingMode, ProgressRecord};
use keylight_strip::SharedSurface;

use crate::chunker::{chunk_events, Chunk};
use crate::control::ControlState;
use crate::midi::OutputSink;
use crate::progress::ProgressLog;
use crate::session::SessionSlot;
use crate::song::SongSource;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncPhase {
    #[default]
    Idle,
    /// A chunk's wait is elapsing; its expectations are not installed yet.
    AwaitingChunk,
    /// Expectations installed, waiting for the player to match them.
    AwaitingMatch,
    Completed,
    Aborted,
}

impl SyncPhase {
    /// Whether a session is in progress.
    pub fn is_active(self) -> bool {
        matches!(self, SyncPhase::AwaitingChunk | SyncPhase::AwaitingMatch)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncTiming {
    /// Upper bound between two checks of the match and abort conditions.
    pub poll_interval: Duration,
    /// How long the whole strip shows the correct color after a finished song.
    pub completion_flash: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5),
            completion_flash: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed(ProgressRecord),
    Aborted,
}

/// Integer percentage of the song done once chunk `index` is matched.
pub fn progress_percent(index: usize, first_note: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (index.saturating_sub(first_note) * 100 / total).min(100) as u8
}

/// Walks a song chunk by chunk, holding each one until the player matches it.
///
/// There is one synchronizer per process. It owns the tutoring session
/// lifecycle; leaving `Tutoring` aborts the running session at the next check.
pub struct Synchronizer {
    state: Arc<ControlState>,
    session: Arc<SessionSlot>,
    surface: SharedSurface,
    songs: Arc<dyn SongSource>,
    progress: Arc<dyn ProgressLog>,
    output: Option<Mutex<Box<dyn OutputSink>>>,
    timing: SyncTiming,
}

impl Synchronizer {
    pub fn new(
        state: Arc<ControlState>,
        session: Arc<SessionSlot>,
        surface: SharedSurface,
        songs: Arc<dyn SongSource>,
        progress: Arc<dyn ProgressLog>,
    ) -> Self {
        Self {
            state,
            session,
            surface,
            songs,
            progress,
            output: None,
            timing: SyncTiming::default(),
        }
    }

    pub fn with_output(mut self, output: Box<dyn OutputSink>) -> Self {
        self.output = Some(Mutex::new(output));
        self
    }

    pub fn with_timing(mut self, timing: SyncTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Runs a session every time the mode becomes `Tutoring`. Parks while idle.
    pub async fn run(mut self) -> Result<()> {
        let mut mode = self.state.subscribe_mode();
        loop {
            mode.wait_for(|current| *current == OperatingMode::Tutoring)
                .await
                .context("control state dropped")?;
            self.run_session().await?;
        }
    }

    /// Plays the selected song once, from session start to completion or abort.
    #[instrument(skip(self))]
    pub async fn run_session(&mut self) -> Result<SessionOutcome> {
        self.set_phase(SyncPhase::AwaitingChunk);
        self.session.open();

        let settings = self.state.settings();
        let Some(song) = settings.song else {
            warn!("tutoring requested without a selected song");
            self.state.set_mode(OperatingMode::FreePlay);
            return self.abort();
        };
        let events = match self.songs.load(&song) {
            Ok(events) => events,
            Err(err) => {
                error!(?err, %song, "failed to load song");
                self.state.set_mode(OperatingMode::FreePlay);
                return self.abort();
            }
        };
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        let first_note = chunks
            .iter()
            .position(|chunk| !chunk.press.is_empty())
            .unwrap_or(0);
        info!(%song, chunks = chunks.len(), profile = settings.profile, "tutoring session started");
        self.state.update_status(|status| {
            status.song = Some(song.clone());
            status.percent = 0;
            status.accuracy = 100.0;
        });

        for (index, chunk) in chunks.iter().enumerate() {
            self.set_phase(SyncPhase::AwaitingChunk);
            if !self.hold(chunk.wait).await {
                return self.abort();
            }
            self.install(chunk)?;
            self.set_phase(SyncPhase::AwaitingMatch);
            if !self.await_match().await {
                return self.abort();
            }
            let percent = progress_percent(index, first_note, chunks.len());
            self.state.update_status(|status| status.percent = percent);
        }
        self.complete(&song, settings.profile).await
    }

    fn tutoring(&self) -> bool {
        self.state.mode() == OperatingMode::Tutoring
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.state.update_status(|status| status.phase = phase);
    }

    /// Sleeps for `wait` unless tutoring ends first. Returns whether to go on.
    async fn hold(&self, wait: Duration) -> bool {
        let mut mode = self.state.subscribe_mode();
        let deadline = sleep(wait);
        tokio::pin!(deadline);
        loop {
            if !self.tutoring() {
                return false;
            }
            tokio::select! {
                _ = &mut deadline => return self.tutoring(),
                changed = mode.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }

    /// Blocks until live state matches the installed chunk. Returns `false`
    /// when tutoring ended instead.
    async fn await_match(&self) -> bool {
        let mut mode = self.state.subscribe_mode();
        loop {
            if !self.tutoring() {
                return false;
            }
            if self.session.is_satisfied() {
                return true;
            }
            tokio::select! {
                _ = self.session.changed() => {}
                changed = mode.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
                _ = sleep(self.timing.poll_interval) => {}
            }
        }
    }

    fn install(&self, chunk: &Chunk) -> Result<()> {
        self.session
            .with_tracker(|tracker| tracker.set_expected(&chunk.press, &chunk.release));
        let palette = self.state.palette();
        let guide = chunk.press.iter().map(|key| (*key, palette.guide));
        let base = chunk.release.iter().map(|key| (*key, palette.base));
        self.surface.paint_keys(guide.chain(base))?;
        debug!(press = chunk.press.len(), release = chunk.release.len(), "chunk installed");

        if self.state.settings().forward_playback {
            self.forward(chunk);
        }
        Ok(())
    }

    fn forward(&self, chunk: &Chunk) {
        let Some(output) = &self.output else {
            return;
        };
        let mut output = output.lock().unwrap_or_else(PoisonError::into_inner);
        let presses = chunk.press.iter().map(|key| KeyEvent::press(*key));
        let releases = chunk.release.iter().map(|key| KeyEvent::release(*key));
        for event in presses.chain(releases) {
            if let Err(err) = output.send(event) {
                warn!(?err, key = %event.key, "forwarding failed, skipped");
            }
        }
    }

    fn abort(&mut self) -> Result<SessionOutcome> {
        self.surface.fill(self.state.palette().base)?;
        self.session.close();
        self.state.update_status(|status| {
            status.phase = SyncPhase::Aborted;
            status.percent = 0;
        });
        info!("tutoring session aborted");
        Ok(SessionOutcome::Aborted)
    }

    async fn complete(&mut self, song: &str, profile: u32) -> Result<SessionOutcome> {
        self.surface.fill(self.state.palette().correct)?;
        sleep(self.timing.completion_flash).await;
        self.surface.fill(self.state.palette().base)?;

        let stats = self.session.close().unwrap_or_default();
        self.state.set_mode(OperatingMode::FreePlay);
        let record = ProgressRecord::now(stats.accuracy());
        if let Err(err) = self.progress.append(profile, song, &record) {
            error!(?err, %song, profile, "failed to record progress");
        }
        self.state.update_status(|status| {
            status.phase = SyncPhase::Completed;
            status.percent = 0;
            status.accuracy = record.accuracy;
        });
        info!(%song, accuracy = record.accuracy, correct = stats.correct, mistakes = stats.mistakes, "tutoring session completed");
        Ok(SessionOutcome::Completed(record))
    }
}
