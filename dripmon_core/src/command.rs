//! External command grammar (WebSocket layer) and operator buttons.

use std::str::FromStr;
use thiserror::Error;

/// Commands the core recognizes from the transport collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CalibrateWpdStart,
    CalibrateWpdStop,
    /// Override the displayed total volume; ignored when <= 0.
    SetTotalVolume(f32),
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("unknown command: {0}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CALIBRATE_WPD_START" => Ok(Command::CalibrateWpdStart),
            "CALIBRATE_WPD_STOP" => Ok(Command::CalibrateWpdStop),
            _ => {
                if let Some(v) = s.strip_prefix("SET_TOTAL_VOLUME:") {
                    v.trim()
                        .parse::<f32>()
                        .map(Command::SetTotalVolume)
                        .map_err(|_| ParseCommandError(s.to_string()))
                } else {
                    Err(ParseCommandError(s.to_string()))
                }
            }
        }
    }
}

/// Operator pushbuttons, delivered by the GPIO collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Init,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    /// A long press on Reset toggles the clamp motor at the collaborator;
    /// the core does not consume it.
    LongPress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_grammar() {
        assert_eq!(
            "CALIBRATE_WPD_START".parse::<Command>().unwrap(),
            Command::CalibrateWpdStart
        );
        assert_eq!(
            "CALIBRATE_WPD_STOP".parse::<Command>().unwrap(),
            Command::CalibrateWpdStop
        );
        assert_eq!(
            "SET_TOTAL_VOLUME:250.5".parse::<Command>().unwrap(),
            Command::SetTotalVolume(250.5)
        );
    }

    #[test]
    fn rejects_unknown_and_malformed() {
        assert!("CALIBRATE_WPD".parse::<Command>().is_err());
        assert!("SET_TOTAL_VOLUME:abc".parse::<Command>().is_err());
        assert!("".parse::<Command>().is_err());
    }
}
