use keylight_domain::DomainError;
use keylight_tutor::ControlCommand;

/// One line typed on the daemon's console.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleLine {
    Set(ControlCommand),
    Status,
    /// Recent progress for a song; the selected song when none is named.
    History(Option<String>),
    Songs,
    Quit,
    Blank,
}

impl ConsoleLine {
    pub fn parse(line: &str) -> Result<Self, DomainError> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let parsed = match word {
            "" => Self::Blank,
            "status" => Self::Status,
            "songs" => Self::Songs,
            "quit" | "exit" => Self::Quit,
            "history" => Self::History((!rest.is_empty()).then(|| rest.to_string())),
            property => {
                if rest.is_empty() {
                    return Err(DomainError::validation(format!("{property} needs a value")));
                }
                Self::Set(ControlCommand::parse(property, rest)?)
            }
        };
        Ok(parsed)
    }
}

pub const HELP: &str = "\
commands:
  <property> <value>   brightness, hueCycling, enablePlayback, profile, lightPreset,
                       baseColor, guideColor, correctColor, falseColor, hueShift,
                       hue, saturation, lightness, currentMode, songOption
  status               current mode and playback status
  history [song]       newest progress records
  songs                songs in the library
  quit";
