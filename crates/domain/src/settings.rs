use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{color::Rgb, DomainError};

/// Highest ambient preset; 0 is the hue sweep, 1..=6 are fixed palettes.
pub const MAX_LIGHT_PRESET: u8 = 6;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum OperatingMode {
    #[default]
    FreePlay,
    Tutoring,
}

impl OperatingMode {
    /// Numeric code used by the control plane (0 = free play, 1 = tutoring).
    pub fn code(self) -> u8 {
        match self {
            OperatingMode::FreePlay => 0,
            OperatingMode::Tutoring => 1,
        }
    }
}

impl TryFrom<u8> for OperatingMode {
    type Error = DomainError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OperatingMode::FreePlay),
            1 => Ok(OperatingMode::Tutoring),
            other => Err(DomainError::validation(format!(
                "unknown operating mode {other}"
            ))),
        }
    }
}

impl fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingMode::FreePlay => f.write_str("free play"),
            OperatingMode::Tutoring => f.write_str("tutoring"),
        }
    }
}

/// Colors used by the guide/correct/incorrect/base rendering contract.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Palette {
    pub base: Rgb,
    pub guide: Rgb,
    pub correct: Rgb,
    pub wrong: Rgb,
}

impl Default for Palette {
    fn default() -> Self {
        Self {
            base: Rgb::new(5, 5, 5),
            guide: Rgb::new(255, 255, 0),
            correct: Rgb::new(0, 255, 0),
            wrong: Rgb::new(255, 0, 0),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmbientSettings {
    pub preset: u8,
    /// Current hue angle in degrees; advanced on every press while cycling.
    pub hue: u16,
    pub saturation: u8,
    pub lightness: u8,
    pub hue_shift: u16,
    pub hue_cycling: bool,
}

impl Default for AmbientSettings {
    fn default() -> Self {
        Self {
            preset: 0,
            hue: 0,
            saturation: 100,
            lightness: 50,
            hue_shift: 3,
            hue_cycling: false,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub palette: Palette,
    pub ambient: AmbientSettings,
    pub brightness: u8,
    /// Echo guide notes to the output device while tutoring.
    pub forward_playback: bool,
    pub profile: u32,
    /// Song identifier (file stem) played when tutoring starts.
    pub song: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            palette: Palette::default(),
            ambient: AmbientSettings::default(),
            brightness: 100,
            forward_playback: false,
            profile: 0,
            song: None,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.ambient.preset > MAX_LIGHT_PRESET {
            return Err(DomainError::validation(format!(
                "light preset must be between 0 and {MAX_LIGHT_PRESET}"
            )));
        }
        if self.ambient.hue >= 360 {
            return Err(DomainError::validation(format!(
                "hue must be below 360 degrees, got {}",
                self.ambient.hue
            )));
        }
        if self.ambient.saturation > 100 || self.ambient.lightness > 100 {
            return Err(DomainError::validation(
                "saturation and lightness are percentages",
            ));
        }
        Ok(())
    }

    pub fn from_json(text: &str) -> Result<Self, DomainError> {
        let settings: Settings = serde_json::from_str(text)
            .map_err(|err| DomainError::Serialization(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, DomainError> {
        serde_json::to_string_pretty(self).map_err(|err| DomainError::Serialization(err.to_string()))
    }

    /// Loads settings from `path`, falling back to defaults when the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DomainError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Self::from_json(&text),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DomainError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
