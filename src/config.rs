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
use std::{error::Error, path::Path, sync::Arc, time::Duration};

use duration_string::DurationString;
use midly::num::u7;
use tracing::info;

use crate::{
    capture,
    operator::{Operator, Terminal, Unattended},
    playsync::CancelHandle,
};

mod audio;
mod error;
mod instrument;
mod output;
mod playback;
mod recorder;

pub use audio::Audio;
pub use error::ConfigError;
pub use instrument::Instrument;
pub use output::Output;
pub use playback::{parse_note, Playback};
pub use recorder::Recorder;

/// Checks that a value fits in 7 bits.
fn seven_bit(name: &str, value: u8) -> Result<u7, ConfigError> {
    if value > 127 {
        return Err(ConfigError::invalid(format!(
            "{} must be between 0 and 127, got {}",
            name, value
        )));
    }
    Ok(u7::from_int_lossy(value))
}

/// Parses an optional duration string such as "1s" or "500ms" into milliseconds.
fn duration_ms(name: &str, value: Option<&str>, default: Duration) -> Result<i64, ConfigError> {
    let duration: Duration = match value {
        Some(value) => DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::invalid(format!("{}: {}", name, e)))?
            .into(),
        None => default,
    };
    i64::try_from(duration.as_millis())
        .map_err(|_| ConfigError::invalid(format!("{} is too long", name)))
}

/// Initializes a recorder from the given config file. Devices are connected here, so a
/// missing MIDI output or capture device fails before anything is played.
pub fn init_recorder(
    path: &Path,
    unattended: bool,
    cancel_handle: CancelHandle,
) -> Result<crate::recorder::Recorder, Box<dyn Error>> {
    let config = Recorder::deserialize(path)?;
    config.validate()?;

    let settings = config.settings()?;
    let instruments = config.instruments()?;
    let driver = if settings.output.enabled {
        Some(capture::get_driver(config.audio())?)
    } else {
        None
    };
    let operator: Arc<dyn Operator> = if unattended {
        Arc::new(Unattended)
    } else {
        Arc::new(Terminal)
    };

    info!(
        config = crate::util::filename_display(path),
        instruments = instruments.len(),
        output = %config.output().directory().display(),
        "Loaded recorder config."
    );
    Ok(crate::recorder::Recorder::new(
        settings,
        instruments,
        driver,
        operator,
        cancel_handle,
    ))
}

/// Initializes a recorder that can only be planned. Nothing is connected.
pub fn init_planner(path: &Path) -> Result<crate::recorder::Recorder, ConfigError> {
    let config = Recorder::deserialize(path)?;
    config.validate()?;

    Ok(crate::recorder::Recorder::new(
        config.settings()?,
        config.offline_instruments()?,
        None,
        Arc::new(Unattended),
        CancelHandle::new(),
    ))
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;
    use crate::recorder::Outcome;

    #[test]
    fn test_durations() {
        let ms = |value, default| duration_ms("on", value, default).map_err(|e| e.to_string());
        assert_eq!(Ok(1500), ms(Some("1500ms"), Duration::ZERO));
        assert_eq!(Ok(2000), ms(Some("2s"), Duration::ZERO));
        assert_eq!(Ok(7), ms(None, Duration::from_millis(7)));
        assert!(duration_ms("on", Some("later"), Duration::ZERO).is_err());
    }

    #[test]
    fn test_seven_bit_values() {
        assert_eq!(127, seven_bit("program", 127).expect("value").as_int());
        assert!(seven_bit("program", 128).is_err());
    }

    fn write_config(dir: &Path, midi_device: &str) -> std::path::PathBuf {
        let path = dir.join("synthrecord.yaml");
        let contents = format!(
            r#"
audio:
  device: mock-capture
  sample_rate: 8000
  channels: 1
playback:
  min_note: 60
  max_note: 61
  on: 20ms
  off: 10ms
  quiet: 20ms
output:
  directory: {}
  threshold: 1
  safety_margin: 1s
  debug: true
instruments:
  - name: psr36
    midi_device: {}
"#,
            dir.join("output").display(),
            midi_device
        );
        fs::write(&path, contents).expect("write");
        path
    }

    #[test]
    fn test_plans_without_devices() {
        let dir = tempfile::tempdir().expect("tempdir");
        let planner = init_planner(&write_config(dir.path(), "mock-psr")).expect("planner");

        let plan = planner.plan().expect("plan");
        assert_eq!("C4", plan.first_note);
        assert_eq!("C#4", plan.last_note);
        assert_eq!("0:00.100", plan.duration);
        assert_eq!(4, plan.cues);
        assert_eq!(vec!["psr36 on mock-psr channel 1"], plan.instruments);
    }

    #[test]
    fn test_records_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(dir.path(), "mock-psr");
        let mut recorder = init_recorder(&path, true, CancelHandle::new()).expect("recorder");

        match recorder.run().expect("run") {
            Outcome::Exported { clips, files, .. } => {
                assert_eq!(2, clips);
                // One raw dump and a WAV per clip.
                assert_eq!(3, files);
            }
            Outcome::Cancelled { .. } => panic!("run was cancelled"),
        }
        assert!(dir.path().join("output").join("capture.raw").exists());
        assert!(dir.path().join("output").join("C#4.wav").exists());
    }

    #[test]
    fn test_unreachable_instrument_fails_setup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_config(dir.path(), "mock-fail");

        assert!(init_recorder(&path, true, CancelHandle::new()).is_err());
        assert!(!dir.path().join("output").exists());

        // Planning doesn't connect to anything.
        assert!(init_planner(&path).is_ok());
    }
}
