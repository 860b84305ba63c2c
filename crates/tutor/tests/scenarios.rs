use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use keylight_domain::{Key, KeyEvent, OperatingMode, Settings, TimedEvent};
use keylight_strip::{AmbientSelector, KeyLayout, MemorySurface, SharedSurface};
use keylight_tutor::{
    ControlCommand, ControlState, Controller, InputDispatcher, MemoryProgressLog, PlaybackStatus, SessionSlot,
    SyncPhase, SyncTiming, Synchronizer,
};
use tokio::time::{sleep, timeout};

const C4: u8 = 60;
const E4: u8 = 64;

fn key(code: u8) -> Key {
    Key::new(code).unwrap()
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

struct Rig {
    state: Arc<ControlState>,
    session: Arc<SessionSlot>,
    surface: SharedSurface,
    progress: Arc<MemoryProgressLog>,
    dispatcher: InputDispatcher,
    controller: Controller,
}

impl Rig {
    fn start(songs: HashMap<String, Vec<TimedEvent>>) -> Self {
        let state = Arc::new(ControlState::new(Settings::default()));
        let session = Arc::new(SessionSlot::new());
        let surface = SharedSurface::new(MemorySurface::new(144), KeyLayout::default());
        let progress = Arc::new(MemoryProgressLog::new());

        let synchronizer = Synchronizer::new(
            Arc::clone(&state),
            Arc::clone(&session),
            surface.clone(),
            Arc::new(songs),
            progress.clone(),
        )
        .with_timing(SyncTiming::default());
        tokio::spawn(synchronizer.run());

        let dispatcher = InputDispatcher::new(Arc::clone(&state), Arc::clone(&session), surface.clone())
            .with_selector(AmbientSelector::seeded(11));
        let controller = Controller::new(Arc::clone(&state), surface.clone());
        Self {
            state,
            session,
            surface,
            progress,
            dispatcher,
            controller,
        }
    }

    async fn select(&self, song: &str) {
        self.controller
            .apply(ControlCommand::SelectSong(song.to_string()))
            .await
            .unwrap();
    }

    fn press(&mut self, code: u8) {
        self.dispatcher.handle(KeyEvent::press(key(code))).unwrap();
    }

    fn release(&mut self, code: u8) {
        self.dispatcher.handle(KeyEvent::release(key(code))).unwrap();
    }

    async fn reach(&self, done: impl FnMut(&PlaybackStatus) -> bool) -> PlaybackStatus {
        let mut status = self.state.subscribe_status();
        let reached = timeout(Duration::from_secs(30), status.wait_for(done))
            .await
            .expect("status reached in time")
            .expect("status channel open");
        reached.clone()
    }

    async fn reach_phase(&self, phase: SyncPhase) -> PlaybackStatus {
        self.reach(|status| status.phase == phase).await
    }
}

fn chord_song() -> Vec<TimedEvent> {
    vec![
        TimedEvent::note_on(C4, ms(0)),
        TimedEvent::note_on(E4, ms(0)),
        TimedEvent::note_off(C4, ms(500)),
        TimedEvent::note_off(E4, ms(0)),
        TimedEvent::end_of_track(ms(0)),
    ]
}

fn single_note_song() -> Vec<TimedEvent> {
    vec![
        TimedEvent::note_on(C4, ms(0)),
        TimedEvent::note_off(C4, ms(250)),
        TimedEvent::end_of_track(ms(0)),
    ]
}

fn library() -> HashMap<String, Vec<TimedEvent>> {
    HashMap::from([
        ("chord".to_string(), chord_song()),
        ("single".to_string(), single_note_song()),
    ])
}

#[tokio::test(start_paused = true)]
async fn chord_song_plays_to_completion() {
    let mut rig = Rig::start(library());
    rig.select("chord").await;

    rig.reach_phase(SyncPhase::AwaitingMatch).await;
    let guide = rig.state.palette().guide;
    assert_eq!(rig.surface.key_color(key(C4)), Some(guide));
    assert_eq!(rig.surface.key_color(key(E4)), Some(guide));

    rig.press(E4);
    rig.press(C4);
    assert_eq!(rig.surface.key_color(key(C4)), Some(rig.state.palette().correct));
    let waiting = rig.reach_phase(SyncPhase::AwaitingChunk).await;
    assert_eq!(waiting.percent, 0);

    // Released inside the 500 ms window: the release chunk is already matched when installed.
    sleep(ms(100)).await;
    rig.release(C4);
    rig.release(E4);

    let done = rig.reach_phase(SyncPhase::Completed).await;
    assert_eq!(done.accuracy, 100.0);
    assert_eq!(done.percent, 0);
    assert_eq!(rig.state.mode(), OperatingMode::FreePlay);
    let records = rig.progress.all(0, "chord");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].accuracy, 100.0);
    let base = rig.state.palette().base;
    assert!(rig.surface.snapshot().iter().all(|c| *c == base));
}

#[tokio::test(start_paused = true)]
async fn wrong_key_blocks_until_corrected() {
    let mut rig = Rig::start(library());
    rig.select("single").await;
    rig.reach_phase(SyncPhase::AwaitingMatch).await;

    rig.press(C4 + 1);
    assert_eq!(rig.session.stats().map(|s| s.mistakes), Some(1));
    assert_eq!(rig.surface.key_color(key(C4 + 1)), Some(rig.state.palette().wrong));
    sleep(ms(50)).await;
    assert_eq!(rig.state.status().phase, SyncPhase::AwaitingMatch);

    rig.press(C4);
    sleep(ms(50)).await;
    assert_eq!(rig.state.status().phase, SyncPhase::AwaitingMatch, "extra key still held");

    rig.release(C4 + 1);
    rig.reach_phase(SyncPhase::AwaitingChunk).await;
    rig.release(C4);

    let done = rig.reach_phase(SyncPhase::Completed).await;
    assert_eq!(done.accuracy, 50.0);
    assert_eq!(rig.progress.all(0, "single")[0].accuracy, 50.0);
}

#[tokio::test(start_paused = true)]
async fn leaving_tutoring_aborts_without_a_record() {
    let rig = Rig::start(library());
    rig.select("chord").await;
    rig.reach_phase(SyncPhase::AwaitingMatch).await;

    rig.controller
        .apply(ControlCommand::Mode(OperatingMode::FreePlay))
        .await
        .unwrap();
    let poll = SyncTiming::default().poll_interval;
    let mut status = rig.state.subscribe_status();
    timeout(poll, status.wait_for(|s| s.phase == SyncPhase::Aborted))
        .await
        .expect("aborted within one poll interval")
        .unwrap();

    let base = rig.state.palette().base;
    assert!(rig.surface.snapshot().iter().all(|c| *c == base));
    assert!(!rig.session.is_open());
    assert!(rig.progress.all(0, "chord").is_empty());
}

#[tokio::test(start_paused = true)]
async fn selecting_another_song_replaces_the_running_session() {
    let rig = Rig::start(library());
    rig.select("chord").await;
    rig.reach_phase(SyncPhase::AwaitingMatch).await;

    rig.select("single").await;
    let status = rig
        .reach(|s| s.phase == SyncPhase::AwaitingMatch && s.song.as_deref() == Some("single"))
        .await;
    assert_eq!(status.percent, 0);
    assert_eq!(rig.state.mode(), OperatingMode::Tutoring);
    assert!(rig.progress.all(0, "chord").is_empty());
    // Only C4 is guided by the new song.
    assert_eq!(rig.surface.key_color(key(E4)), Some(rig.state.palette().base));
}

#[tokio::test(start_paused = true)]
async fn replaying_with_identical_input_gives_identical_accuracy() {
    let mut rig = Rig::start(library());
    for _ in 0..2 {
        rig.select("single").await;
        rig.reach(|s| s.phase == SyncPhase::AwaitingMatch && s.accuracy == 100.0).await;
        rig.press(E4);
        rig.release(E4);
        rig.press(C4);
        rig.reach_phase(SyncPhase::AwaitingChunk).await;
        rig.release(C4);
        rig.reach_phase(SyncPhase::Completed).await;
    }
    let records = rig.progress.all(0, "single");
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].accuracy, 50.0);
    assert_eq!(records[0].accuracy, records[1].accuracy);
}

#[tokio::test(start_paused = true)]
async fn free_play_lights_keys_without_a_session() {
    let mut rig = Rig::start(library());
    rig.press(C4);
    assert_ne!(rig.surface.key_color(key(C4)), Some(rig.state.palette().base));
    rig.release(C4);
    assert_eq!(rig.surface.key_color(key(C4)), Some(rig.state.palette().base));
    assert!(!rig.session.is_open());
}
