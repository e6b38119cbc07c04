// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::time::Duration;

use serde::Deserialize;

use super::{duration_ms, error::ConfigError, seven_bit};
use crate::{midi, recorder};

const DEFAULT_MIN_NOTE: u8 = 36;
const DEFAULT_MAX_NOTE: u8 = 96;
const DEFAULT_ON: Duration = Duration::from_secs(1);
const DEFAULT_OFF: Duration = Duration::from_secs(1);
const DEFAULT_QUIET: Duration = Duration::from_millis(500);
const DEFAULT_ON_VELOCITY: u8 = 127;
const DEFAULT_OFF_VELOCITY: u8 = 64;

/// A YAML representation of the note sequence.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Playback {
    /// Whether to play notes at all (default: true)
    enabled: Option<bool>,

    /// The first note, as a name (C2) or a number (default: C2)
    min_note: Option<String>,

    /// The last note, inclusive (default: C7)
    max_note: Option<String>,

    /// How long each note is held (default: 1s)
    on: Option<String>,

    /// How long to wait after the release before silencing everything (default: 1s)
    off: Option<String>,

    /// How long to wait before the next note (default: 500ms)
    quiet: Option<String>,

    on_velocity: Option<u8>,
    off_velocity: Option<u8>,
}

/// Parses a note given either by name or by number.
pub fn parse_note(note: &str) -> Result<u8, ConfigError> {
    let note = note.trim();
    let value = match note.parse::<u32>() {
        Ok(value) => u8::try_from(value).ok().filter(|value| *value <= 127),
        Err(_) => midi::note_value(note),
    };
    value.ok_or_else(|| ConfigError::invalid(format!("invalid note {}", note)))
}

impl Playback {
    fn note(note: &Option<String>, default: u8) -> Result<u8, ConfigError> {
        match note {
            Some(note) => parse_note(note),
            None => Ok(default),
        }
    }

    /// Converts the configuration into playback settings.
    pub fn to_playback(&self) -> Result<recorder::Playback, ConfigError> {
        let min_note = Self::note(&self.min_note, DEFAULT_MIN_NOTE)?;
        let max_note = Self::note(&self.max_note, DEFAULT_MAX_NOTE)?;
        if min_note > max_note {
            return Err(ConfigError::invalid(format!(
                "min_note {} is above max_note {}",
                midi::note_name(min_note as u32),
                midi::note_name(max_note as u32)
            )));
        }

        Ok(recorder::Playback {
            enabled: self.enabled.unwrap_or(true),
            min_note: seven_bit("min_note", min_note)?,
            max_note: seven_bit("max_note", max_note)?,
            on_ms: duration_ms("on", self.on.as_deref(), DEFAULT_ON)?,
            off_ms: duration_ms("off", self.off.as_deref(), DEFAULT_OFF)?,
            quiet_ms: duration_ms("quiet", self.quiet.as_deref(), DEFAULT_QUIET)?,
            on_velocity: seven_bit(
                "on_velocity",
                self.on_velocity.unwrap_or(DEFAULT_ON_VELOCITY),
            )?,
            off_velocity: seven_bit(
                "off_velocity",
                self.off_velocity.unwrap_or(DEFAULT_OFF_VELOCITY),
            )?,
        })
    }
}

#[cfg(test)]
mod test {
    use config::{Config, File, FileFormat};

    use super::*;

    fn parse(yaml: &str) -> Playback {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .expect("build")
            .try_deserialize::<Playback>()
            .expect("deserialize")
    }

    #[test]
    fn test_notes_by_name_or_number() {
        assert_eq!(60, parse_note("C4").expect("note"));
        assert_eq!(61, parse_note("Db4").expect("note"));
        assert_eq!(96, parse_note("96").expect("note"));
        assert_eq!(127, parse_note(" 127 ").expect("note"));
        assert!(parse_note("128").is_err());
        assert!(parse_note("H4").is_err());
        assert!(parse_note("").is_err());
    }

    #[test]
    fn test_defaults() {
        let playback = Playback::default().to_playback().expect("playback");
        assert!(playback.enabled);
        assert_eq!(36, playback.min_note.as_int());
        assert_eq!(96, playback.max_note.as_int());
        assert_eq!((1000, 1000, 500), (playback.on_ms, playback.off_ms, playback.quiet_ms));
        assert_eq!(127, playback.on_velocity.as_int());
        assert_eq!(64, playback.off_velocity.as_int());
    }

    #[test]
    fn test_parses_yaml() {
        let playback = parse(
            r#"
            min_note: C4
            max_note: 62
            on: 250ms
            off: 1s
            quiet: 2s
            on_velocity: 100
            "#,
        )
        .to_playback()
        .expect("playback");

        assert_eq!(60, playback.min_note.as_int());
        assert_eq!(62, playback.max_note.as_int());
        assert_eq!((250, 1000, 2000), (playback.on_ms, playback.off_ms, playback.quiet_ms));
        assert_eq!(100, playback.on_velocity.as_int());
        assert_eq!(3, playback.notes());
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse("min_note: D4\nmax_note: C4").to_playback().is_err());
        assert!(parse("on_velocity: 128").to_playback().is_err());
        assert!(parse("quiet: soon").to_playback().is_err());
        assert!(parse("max_note: G#9").to_playback().is_err());
    }
}
