use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DomainError;

/// Number of representable keys (MIDI note codes 0..=119).
pub const KEY_COUNT: usize = 120;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A physical key, identified by its MIDI note code.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u8", into = "u8")]
pub struct Key(u8);

impl Key {
    pub fn new(code: u8) -> Result<Self, DomainError> {
        if usize::from(code) >= KEY_COUNT {
            return Err(DomainError::validation(format!(
                "key code {code} is outside 0..{KEY_COUNT}"
            )));
        }
        Ok(Self(code))
    }

    pub fn code(self) -> u8 {
        self.0
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }

    /// Every key in the representable range, lowest first.
    pub fn all() -> impl Iterator<Item = Key> {
        (0..KEY_COUNT as u8).map(Key)
    }

    /// Scientific pitch name, e.g. `C4` for code 60.
    pub fn name(self) -> String {
        let octave = i16::from(self.0 / 12) - 1;
        format!("{}{}", NOTE_NAMES[self.index() % 12], octave)
    }
}

impl TryFrom<u8> for Key {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Key::new(code)
    }
}

impl From<Key> for u8 {
    fn from(key: Key) -> Self {
        key.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum KeyAction {
    Press,
    Release,
}

/// A press or release of one key, as played live or forwarded to an output device.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub action: KeyAction,
    pub key: Key,
}

impl KeyEvent {
    pub fn press(key: Key) -> Self {
        Self {
            action: KeyAction::Press,
            key,
        }
    }

    pub fn release(key: Key) -> Self {
        Self {
            action: KeyAction::Release,
            key,
        }
    }
}

/// One entry of a song as read from a song file.
///
/// Key codes are raw here: a song file may reference notes outside the
/// representable range and those are dropped during chunking.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum SongEvent {
    NoteOn { key: u8, velocity: u8 },
    NoteOff { key: u8 },
    /// Anything that is not a note (tempo, program change, text, ...).
    Other,
    EndOfTrack,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimedEvent {
    /// Time elapsed since the previous event of the song.
    pub delay: Duration,
    pub event: SongEvent,
}

impl TimedEvent {
    pub fn new(delay: Duration, event: SongEvent) -> Self {
        Self { delay, event }
    }

    pub fn note_on(key: u8, delay: Duration) -> Self {
        Self::new(delay, SongEvent::NoteOn { key, velocity: 64 })
    }

    pub fn note_off(key: u8, delay: Duration) -> Self {
        Self::new(delay, SongEvent::NoteOff { key })
    }

    pub fn end_of_track(delay: Duration) -> Self {
        Self::new(delay, SongEvent::EndOfTrack)
    }
}
