pub mod color;
pub mod error;
pub mod events;
pub mod progress;
pub mod settings;

pub use crate::color::{hsl_to_rgb, Rgb};
pub use crate::error::DomainError;
pub use crate::events::{Key, KeyAction, KeyEvent, SongEvent, TimedEvent, KEY_COUNT};
pub use crate::progress::{ProgressRecord, PROGRESS_HEADER};
pub use crate::settings::{AmbientSettings, OperatingMode, Palette, Settings, MAX_LIGHT_PRESET};
