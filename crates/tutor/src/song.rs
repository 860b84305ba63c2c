use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use thiserror::Error;
use tracing::{debug, instrument};

use keylight_domain::{SongEvent, TimedEvent};

const SONG_EXTENSION: &str = "mid";
const DEFAULT_TEMPO_US: u32 = 500_000;

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("song {0:?} not found")]
    NotFound(String),
    #[error("invalid song name {0:?}")]
    InvalidName(String),
}

/// Yields the ordered event sequence of a song.
pub trait SongSource: Send + Sync {
    fn load(&self, song: &str) -> Result<Vec<TimedEvent>>;
}

impl SongSource for HashMap<String, Vec<TimedEvent>> {
    fn load(&self, song: &str) -> Result<Vec<TimedEvent>> {
        self.get(song)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(song.to_string()).into())
    }
}

/// A directory of Standard MIDI Files, addressed by file stem.
#[derive(Debug, Clone)]
pub struct SongLibrary {
    dir: PathBuf,
}

impl SongLibrary {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Song names available in the library, sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err).with_context(|| format!("read song directory {:?}", self.dir)),
        };
        let mut songs = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SONG_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                songs.push(stem.to_string());
            }
        }
        songs.sort();
        Ok(songs)
    }

    pub fn path_of(&self, song: &str) -> Result<PathBuf, LibraryError> {
        if song.is_empty() || song.contains(['/', '\\']) || song.starts_with('.') {
            return Err(LibraryError::InvalidName(song.to_string()));
        }
        Ok(self.dir.join(format!("{song}.{SONG_EXTENSION}")))
    }
}

impl SongSource for SongLibrary {
    #[instrument(skip(self))]
    fn load(&self, song: &str) -> Result<Vec<TimedEvent>> {
        let path = self.path_of(song)?;
        if !path.exists() {
            return Err(LibraryError::NotFound(song.to_string()).into());
        }
        let bytes = std::fs::read(&path).with_context(|| format!("read song file {path:?}"))?;
        let events = parse_smf(&bytes).with_context(|| format!("parse song file {path:?}"))?;
        debug!(events = events.len(), "song loaded");
        Ok(events)
    }
}

/// Flattens a Standard MIDI File into one timed event sequence.
///
/// Tracks are merged by absolute tick, keeping track order for ties. Delays are
/// converted to wall time with the tempo in force before each event. Per-track
/// end markers are replaced by a single `EndOfTrack` at the end of the longest
/// track.
pub fn parse_smf(bytes: &[u8]) -> Result<Vec<TimedEvent>> {
    let smf = Smf::parse(bytes).context("failed to parse MIDI file")?;

    let mut merged = Vec::new();
    let mut end_tick = 0u64;
    for track in &smf.tracks {
        let mut tick = 0u64;
        for event in track {
            tick += u64::from(event.delta.as_int());
            end_tick = end_tick.max(tick);
            if !matches!(event.kind, TrackEventKind::Meta(MetaMessage::EndOfTrack)) {
                merged.push((tick, event.kind));
            }
        }
    }
    merged.sort_by_key(|(tick, _)| *tick);

    let mut tempo_us = DEFAULT_TEMPO_US;
    let mut previous = 0u64;
    let mut events = Vec::with_capacity(merged.len() + 1);
    for (tick, kind) in merged {
        let delay = ticks_to_duration(tick - previous, smf.header.timing, tempo_us);
        previous = tick;
        let event = match kind {
            TrackEventKind::Midi { message, .. } => match message {
                MidiMessage::NoteOn { key, vel } => SongEvent::NoteOn {
                    key: key.as_int(),
                    velocity: vel.as_int(),
                },
                MidiMessage::NoteOff { key, .. } => SongEvent::NoteOff { key: key.as_int() },
                _ => SongEvent::Other,
            },
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => {
                tempo_us = tempo.as_int();
                SongEvent::Other
            }
            _ => SongEvent::Other,
        };
        events.push(TimedEvent::new(delay, event));
    }
    let tail = ticks_to_duration(end_tick - previous, smf.header.timing, tempo_us);
    events.push(TimedEvent::end_of_track(tail));
    Ok(events)
}

fn ticks_to_duration(ticks: u64, timing: Timing, tempo_us: u32) -> Duration {
    if ticks == 0 {
        return Duration::ZERO;
    }
    let seconds = match timing {
        Timing::Metrical(ppq) => {
            ticks as f64 / f64::from(ppq.as_int().max(1)) * f64::from(tempo_us) / 1_000_000.0
        }
        Timing::Timecode(fps, subframes) => {
            ticks as f64 / (f64::from(fps.as_f32()) * f64::from(subframes.max(1)))
        }
    };
    Duration::from_secs_f64(seconds)
}
