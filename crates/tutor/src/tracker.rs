use tracing::trace;

use keylight_domain::{Key, KEY_COUNT};

use crate::scoring::AccuracyStats;

/// What a live press meant against the current guide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// The key was expected: the guide is satisfied for it.
    Correct,
    Mismatch,
}

/// Live versus expected state of every key for one tutoring session.
#[derive(Debug, Clone)]
pub struct KeyStateTracker {
    live: [bool; KEY_COUNT],
    expected: [bool; KEY_COUNT],
    stats: AccuracyStats,
}

impl KeyStateTracker {
    pub fn new() -> Self {
        Self {
            live: [false; KEY_COUNT],
            expected: [false; KEY_COUNT],
            stats: AccuracyStats::default(),
        }
    }

    pub fn apply_press(&mut self, key: Key) -> PressOutcome {
        self.live[key.index()] = true;
        if self.expected[key.index()] {
            self.stats.correct += 1;
            PressOutcome::Correct
        } else {
            self.stats.mistakes += 1;
            PressOutcome::Mismatch
        }
    }

    /// Records a release and reports whether the key is still expected down.
    pub fn apply_release(&mut self, key: Key) -> bool {
        self.live[key.index()] = false;
        self.expected[key.index()]
    }

    /// Installs a chunk's requirements. Keys in neither set keep their expectation.
    pub fn set_expected<'a>(
        &mut self,
        press: impl IntoIterator<Item = &'a Key>,
        release: impl IntoIterator<Item = &'a Key>,
    ) {
        for key in press {
            self.expected[key.index()] = true;
        }
        for key in release {
            self.expected[key.index()] = false;
        }
        trace!(expected = self.expected.iter().filter(|e| **e).count(), "expectations installed");
    }

    pub fn is_satisfied(&self) -> bool {
        self.live == self.expected
    }

    pub fn is_live(&self, key: Key) -> bool {
        self.live[key.index()]
    }

    pub fn is_expected(&self, key: Key) -> bool {
        self.expected[key.index()]
    }

    pub fn stats(&self) -> AccuracyStats {
        self.stats
    }
}

impl Default for KeyStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
