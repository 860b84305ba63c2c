use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use keylight_domain::{Key, SongEvent, TimedEvent};

/// Keys pressed and released at the same instant of a song.
///
/// `wait` elapses before the chunk's keys become the expected state.
/// `press` and `release` are always disjoint.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub press: BTreeSet<Key>,
    pub release: BTreeSet<Key>,
    pub wait: Duration,
}

impl Chunk {
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            ..Self::default()
        }
    }

    // The later of two same-instant events on one key wins.
    fn add_press(&mut self, key: Key) {
        self.release.remove(&key);
        self.press.insert(key);
    }

    fn add_release(&mut self, key: Key) {
        self.press.remove(&key);
        self.release.insert(key);
    }
}

/// Lazily groups timed song events into [`Chunk`]s.
///
/// A new chunk starts at every note event with a nonzero delay. Non-note
/// events never form chunks; their delay is carried to the next note event so
/// song timing is kept. `EndOfTrack` ends the sequence, emitting whatever was
/// still accumulating.
pub struct Chunker<I> {
    events: I,
    pending: Option<Chunk>,
    carried: Duration,
    finished: bool,
}

pub fn chunk_events<I>(events: I) -> Chunker<I::IntoIter>
where
    I: IntoIterator<Item = TimedEvent>,
{
    Chunker {
        events: events.into_iter(),
        pending: None,
        carried: Duration::ZERO,
        finished: false,
    }
}

impl<I> Iterator for Chunker<I>
where
    I: Iterator<Item = TimedEvent>,
{
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.finished {
            return None;
        }
        loop {
            let Some(timed) = self.events.next() else {
                self.finished = true;
                return self.pending.take();
            };
            let delay = self.carried + timed.delay;
            let (code, pressed) = match timed.event {
                SongEvent::EndOfTrack => {
                    self.finished = true;
                    return self.pending.take();
                }
                SongEvent::Other => {
                    self.carried = delay;
                    continue;
                }
                SongEvent::NoteOn { key, velocity } => (key, velocity > 0),
                SongEvent::NoteOff { key } => (key, false),
            };
            let Ok(key) = Key::new(code) else {
                warn!(code, "skipping song note outside the key range");
                self.carried = delay;
                continue;
            };
            self.carried = Duration::ZERO;

            let ready = if delay.is_zero() { None } else { self.pending.take() };
            let chunk = self.pending.get_or_insert_with(|| Chunk::new(delay));
            if pressed {
                chunk.add_press(key);
            } else {
                chunk.add_release(key);
            }
            if let Some(chunk) = ready {
                trace!(press = chunk.press.len(), release = chunk.release.len(), "chunk ready");
                return Some(chunk);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn ms(millis: u64) -> Duration {
        Duration::from_millis(millis)
    }

    fn keys(codes: &[u8]) -> BTreeSet<Key> {
        codes.iter().map(|c| Key::new(*c).unwrap()).collect()
    }

    #[test]
    fn chord_then_release() {
        let events = vec![
            TimedEvent::note_on(60, ms(0)),
            TimedEvent::note_on(64, ms(0)),
            TimedEvent::note_off(60, ms(500)),
            TimedEvent::note_off(64, ms(0)),
            TimedEvent::end_of_track(ms(0)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(
            chunks,
            vec![
                Chunk { press: keys(&[60, 64]), release: keys(&[]), wait: ms(0) },
                Chunk { press: keys(&[]), release: keys(&[60, 64]), wait: ms(500) },
            ]
        );
    }

    #[test]
    fn zero_velocity_press_is_a_release() {
        let events = vec![
            TimedEvent::note_on(60, ms(0)),
            TimedEvent::new(ms(250), SongEvent::NoteOn { key: 60, velocity: 0 }),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].release, keys(&[60]));
        assert!(chunks[1].press.is_empty());
    }

    #[test]
    fn metadata_delay_carries_to_next_note() {
        let events = vec![
            TimedEvent::new(ms(0), SongEvent::Other),
            TimedEvent::note_on(60, ms(0)),
            TimedEvent::new(ms(100), SongEvent::Other),
            TimedEvent::note_on(62, ms(50)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].wait, ms(0));
        assert_eq!(chunks[1].wait, ms(150));
        assert_eq!(chunks[1].press, keys(&[62]));
    }

    #[test]
    fn leading_delay_becomes_first_wait() {
        let events = vec![
            TimedEvent::new(ms(300), SongEvent::Other),
            TimedEvent::note_on(60, ms(200)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(chunks, vec![Chunk { press: keys(&[60]), release: keys(&[]), wait: ms(500) }]);
    }

    #[test]
    fn end_of_track_with_nothing_pending_emits_nothing() {
        let events = vec![
            TimedEvent::new(ms(0), SongEvent::Other),
            TimedEvent::end_of_track(ms(400)),
            TimedEvent::note_on(60, ms(0)),
        ];
        assert_eq!(chunk_events(events).count(), 0);
    }

    #[test]
    fn out_of_range_notes_are_skipped_but_keep_timing() {
        let events = vec![
            TimedEvent::note_on(60, ms(0)),
            TimedEvent::note_on(125, ms(100)),
            TimedEvent::note_on(62, ms(0)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].wait, ms(100));
        assert_eq!(chunks[1].press, keys(&[62]));
    }

    #[test]
    fn same_instant_press_and_release_stay_disjoint() {
        let events = vec![
            TimedEvent::note_on(60, ms(0)),
            TimedEvent::note_off(60, ms(0)),
            TimedEvent::note_on(62, ms(0)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].press, keys(&[62]));
        assert_eq!(chunks[0].release, keys(&[60]));
    }

    #[test]
    fn chunks_preserve_every_note_and_its_wait() {
        let events = vec![
            TimedEvent::note_on(48, ms(10)),
            TimedEvent::note_on(52, ms(0)),
            TimedEvent::note_off(48, ms(20)),
            TimedEvent::note_on(55, ms(0)),
            TimedEvent::note_off(52, ms(30)),
            TimedEvent::note_off(55, ms(40)),
            TimedEvent::end_of_track(ms(0)),
        ];
        let chunks: Vec<Chunk> = chunk_events(events).collect();
        let waits: Vec<Duration> = chunks.iter().map(|c| c.wait).collect();
        assert_eq!(waits, vec![ms(10), ms(20), ms(30), ms(40)]);

        let pressed: Vec<u8> = chunks.iter().flat_map(|c| c.press.iter().map(|k| k.code())).collect();
        let released: Vec<u8> = chunks.iter().flat_map(|c| c.release.iter().map(|k| k.code())).collect();
        assert_eq!(pressed, vec![48, 52, 55]);
        assert_eq!(released, vec![48, 52, 55]);
    }

    /// Groups in-range note events by the instant they happen at, the later
    /// event on a key winning, and turns each instant into the chunk it
    /// should produce.
    fn grouped_by_instant(events: &[TimedEvent]) -> Vec<Chunk> {
        let mut instants: Vec<(Duration, BTreeMap<Key, bool>)> = Vec::new();
        let mut now = Duration::ZERO;
        for timed in events {
            now += timed.delay;
            let (code, pressed) = match timed.event {
                SongEvent::EndOfTrack => break,
                SongEvent::Other => continue,
                SongEvent::NoteOn { key, velocity } => (key, velocity > 0),
                SongEvent::NoteOff { key } => (key, false),
            };
            let Ok(key) = Key::new(code) else { continue };
            match instants.last_mut() {
                Some((at, keys)) if *at == now => {
                    keys.insert(key, pressed);
                }
                _ => instants.push((now, BTreeMap::from([(key, pressed)]))),
            }
        }
        let mut previous = Duration::ZERO;
        instants
            .into_iter()
            .map(|(at, keys)| {
                let wait = at - previous;
                previous = at;
                Chunk {
                    press: keys.iter().filter(|(_, p)| **p).map(|(k, _)| *k).collect(),
                    release: keys.iter().filter(|(_, p)| !**p).map(|(k, _)| *k).collect(),
                    wait,
                }
            })
            .collect()
    }

    #[test]
    fn mixed_sequences_chunk_by_instant() {
        let velocity_zero = |key, delay| TimedEvent::new(delay, SongEvent::NoteOn { key, velocity: 0 });
        let meta = |delay| TimedEvent::new(delay, SongEvent::Other);
        let table: Vec<(&str, Vec<TimedEvent>)> = vec![
            (
                "metadata between notes",
                vec![
                    meta(ms(5)),
                    TimedEvent::note_on(60, ms(0)),
                    meta(ms(40)),
                    TimedEvent::note_on(64, ms(0)),
                    meta(ms(0)),
                    TimedEvent::note_off(60, ms(60)),
                    TimedEvent::note_off(64, ms(0)),
                    TimedEvent::end_of_track(ms(10)),
                ],
            ),
            (
                "zero-velocity note-ons",
                vec![
                    TimedEvent::note_on(50, ms(0)),
                    TimedEvent::note_on(53, ms(0)),
                    velocity_zero(50, ms(120)),
                    TimedEvent::note_on(57, ms(0)),
                    velocity_zero(53, ms(80)),
                    velocity_zero(57, ms(0)),
                    TimedEvent::note_on(50, ms(0)),
                    velocity_zero(50, ms(30)),
                ],
            ),
            (
                "out-of-range keys",
                vec![
                    TimedEvent::note_on(127, ms(15)),
                    TimedEvent::note_on(36, ms(0)),
                    TimedEvent::note_off(121, ms(25)),
                    TimedEvent::note_off(36, ms(0)),
                    TimedEvent::note_on(120, ms(35)),
                    TimedEvent::note_on(119, ms(5)),
                    TimedEvent::end_of_track(ms(0)),
                ],
            ),
            (
                "same key flipping at one instant",
                vec![
                    TimedEvent::note_on(70, ms(0)),
                    TimedEvent::note_off(70, ms(200)),
                    TimedEvent::note_on(70, ms(0)),
                    meta(ms(0)),
                    TimedEvent::note_off(70, ms(100)),
                    TimedEvent::note_on(70, ms(0)),
                    TimedEvent::note_off(70, ms(0)),
                ],
            ),
            ("metadata only", vec![meta(ms(10)), meta(ms(20)), TimedEvent::end_of_track(ms(5))]),
        ];

        for (name, events) in table {
            let chunks: Vec<Chunk> = chunk_events(events.clone()).collect();
            assert_eq!(chunks, grouped_by_instant(&events), "{name}");
            for chunk in &chunks {
                assert!(chunk.press.is_disjoint(&chunk.release), "{name}");
            }
        }
    }
}
