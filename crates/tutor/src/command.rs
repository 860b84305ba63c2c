use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use keylight_domain::{DomainError, OperatingMode, Rgb, MAX_LIGHT_PRESET};
use keylight_strip::SharedSurface;

use crate::control::ControlState;

/// One settable control-plane property.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    Brightness(u8),
    HueCycling(bool),
    ForwardPlayback(bool),
    Profile(u32),
    LightPreset(u8),
    BaseColor(Rgb),
    GuideColor(Rgb),
    CorrectColor(Rgb),
    WrongColor(Rgb),
    HueShift(u16),
    Hue(u16),
    Saturation(u8),
    Lightness(u8),
    Mode(OperatingMode),
    SelectSong(String),
}

fn number<T: std::str::FromStr>(property: &str, value: &str) -> Result<T, DomainError> {
    value
        .trim()
        .parse()
        .map_err(|_| DomainError::validation(format!("{property} expects a number, got {value:?}")))
}

fn percent(property: &str, value: &str) -> Result<u8, DomainError> {
    let parsed: u8 = number(property, value)?;
    if parsed > 100 {
        return Err(DomainError::validation(format!("{property} must be 0..=100")));
    }
    Ok(parsed)
}

fn flag(property: &str, value: &str) -> Result<bool, DomainError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(DomainError::validation(format!("{property} expects true or false"))),
    }
}

impl ControlCommand {
    /// Parses a `(property, value)` pair as sent by the control panel.
    pub fn parse(property: &str, value: &str) -> Result<Self, DomainError> {
        let command = match property {
            "brightness" => Self::Brightness(number(property, value)?),
            "hueCycling" => Self::HueCycling(flag(property, value)?),
            "enablePlayback" => Self::ForwardPlayback(flag(property, value)?),
            "profile" => Self::Profile(number(property, value)?),
            "lightPreset" => {
                let preset: u8 = number(property, value)?;
                if preset > MAX_LIGHT_PRESET {
                    return Err(DomainError::validation(format!(
                        "lightPreset must be 0..={MAX_LIGHT_PRESET}"
                    )));
                }
                Self::LightPreset(preset)
            }
            "baseColor" => Self::BaseColor(value.parse()?),
            "guideColor" => Self::GuideColor(value.parse()?),
            "correctColor" => Self::CorrectColor(value.parse()?),
            "falseColor" => Self::WrongColor(value.parse()?),
            "hueShift" => Self::HueShift(number(property, value)?),
            "hue" => Self::Hue(number::<u16>(property, value)? % 360),
            "saturation" => Self::Saturation(percent(property, value)?),
            "lightness" => Self::Lightness(percent(property, value)?),
            "currentMode" => Self::Mode(OperatingMode::try_from(number::<u8>(property, value)?)?),
            "songOption" => {
                let song = value.trim();
                if song.is_empty() {
                    return Err(DomainError::validation("songOption needs a song name"));
                }
                Self::SelectSong(song.to_string())
            }
            other => return Err(DomainError::validation(format!("unknown property {other:?}"))),
        };
        Ok(command)
    }
}

/// Applies control commands to the shared state and the strip.
#[derive(Clone)]
pub struct Controller {
    state: Arc<ControlState>,
    surface: SharedSurface,
}

impl Controller {
    pub fn new(state: Arc<ControlState>, surface: SharedSurface) -> Self {
        Self { state, surface }
    }

    pub fn state(&self) -> &Arc<ControlState> {
        &self.state
    }

    pub async fn apply(&self, command: ControlCommand) -> Result<()> {
        info!(?command, "control command");
        match command {
            ControlCommand::Brightness(brightness) => {
                self.state.update_settings(|s| s.brightness = brightness);
                self.surface.set_brightness(brightness)?;
            }
            ControlCommand::HueCycling(on) => self.state.update_settings(|s| s.ambient.hue_cycling = on),
            ControlCommand::ForwardPlayback(on) => self.state.update_settings(|s| s.forward_playback = on),
            ControlCommand::Profile(profile) => self.state.update_settings(|s| s.profile = profile),
            ControlCommand::LightPreset(preset) => self.state.update_settings(|s| s.ambient.preset = preset),
            ControlCommand::BaseColor(color) => {
                self.state.update_settings(|s| s.palette.base = color);
                self.surface.fill(color)?;
            }
            ControlCommand::GuideColor(color) => self.state.update_settings(|s| s.palette.guide = color),
            ControlCommand::CorrectColor(color) => self.state.update_settings(|s| s.palette.correct = color),
            ControlCommand::WrongColor(color) => self.state.update_settings(|s| s.palette.wrong = color),
            ControlCommand::HueShift(shift) => self.state.update_settings(|s| s.ambient.hue_shift = shift),
            ControlCommand::Hue(hue) => self.state.update_settings(|s| s.ambient.hue = hue),
            ControlCommand::Saturation(value) => self.state.update_settings(|s| s.ambient.saturation = value),
            ControlCommand::Lightness(value) => self.state.update_settings(|s| s.ambient.lightness = value),
            ControlCommand::Mode(mode) => self.state.set_mode(mode),
            ControlCommand::SelectSong(song) => self.select_song(song).await?,
        }
        Ok(())
    }

    /// Ends any running session, then starts tutoring `song`.
    pub async fn select_song(&self, song: String) -> Result<()> {
        self.state.set_mode(OperatingMode::FreePlay);
        let mut status = self.state.subscribe_status();
        status
            .wait_for(|status| !status.phase.is_active())
            .await
            .context("status channel closed")?;
        self.state.update_settings(|s| s.song = Some(song));
        self.state.set_mode(OperatingMode::Tutoring);
        Ok(())
    }
}
