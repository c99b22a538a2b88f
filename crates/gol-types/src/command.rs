//! Control commands sent from an external controller to an active run.
//!
//! Commands arrive either as strings on the remote protocol (`"save"`,
//! `"pause"`, `"quit"`, `"kill"`) or as single key presses on the local
//! controller (`s`, `p`, `q`, `k`). Both encodings parse into [`Command`].

use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// An unrecognised command string or key.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid command: {input:?}")]
pub struct InvalidCommand {
    /// The input that could not be parsed.
    pub input: String,
}

/// A control command for an active run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Return a snapshot of the current world.
    Save,
    /// Toggle between running and paused.
    Pause,
    /// Terminate the run at the next turn boundary.
    Quit,
    /// Terminate the run and shut down the process hosting it.
    Kill,
}

impl Command {
    /// The protocol string for this command.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Pause => "pause",
            Self::Quit => "quit",
            Self::Kill => "kill",
        }
    }

    /// Map a key press to a command.
    ///
    /// Returns `None` for keys with no binding.
    pub const fn from_key(key: char) -> Option<Self> {
        match key {
            's' | 'S' => Some(Self::Save),
            'p' | 'P' => Some(Self::Pause),
            'q' | 'Q' => Some(Self::Quit),
            'k' | 'K' => Some(Self::Kill),
            _ => None,
        }
    }

    /// Whether this command ends the run.
    pub const fn terminates(self) -> bool {
        matches!(self, Self::Quit | Self::Kill)
    }
}

impl FromStr for Command {
    type Err = InvalidCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "save" => Ok(Self::Save),
            "pause" => Ok(Self::Pause),
            "quit" => Ok(Self::Quit),
            "kill" => Ok(Self::Kill),
            _ => Err(InvalidCommand {
                input: s.to_owned(),
            }),
        }
    }
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
