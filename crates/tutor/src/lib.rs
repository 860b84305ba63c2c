pub mod chunker;
pub mod command;
pub mod control;
pub mod dispatcher;
pub mod midi;
pub mod progress;
pub mod scoring;
pub mod session;
pub mod song;
pub mod synchronizer;
pub mod tracker;

pub use chunker::{chunk_events, Chunk, Chunker};
pub use command::{ControlCommand, Controller};
pub use control::{ControlState, PlaybackStatus};
pub use dispatcher::InputDispatcher;
pub use midi::{InputSource, MidiDevice, MidiForwarder, MidiManager, OutputSink};
pub use progress::{CsvProgressLog, MemoryProgressLog, ProgressLog, DEFAULT_HISTORY_LEN};
pub use scoring::AccuracyStats;
pub use session::SessionSlot;
pub use song::{parse_smf, LibraryError, SongLibrary, SongSource};
pub use synchronizer::{SessionOutcome, SyncPhase, SyncTiming, Synchronizer};
pub use tracker::{KeyStateTracker, PressOutcome};
